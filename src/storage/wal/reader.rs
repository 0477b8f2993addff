//! Sequential reader over unapplied log segments

use std::collections::VecDeque;

use crate::error::WalError;
use crate::storage::wal::recovery::Segment;
use crate::traits::LogReader;

/// Reader over segments captured when it was created
#[derive(Debug, Default)]
pub struct FileLogReader {
    segments: VecDeque<Segment>,
    current: VecDeque<Vec<u8>>,
    current_count: u32,
}

impl FileLogReader {
    pub(crate) fn new(segments: VecDeque<Segment>) -> Self {
        Self {
            segments,
            ..Default::default()
        }
    }
}

impl LogReader for FileLogReader {
    fn next_segment(&mut self) -> Result<Option<i64>, WalError> {
        let Some(segment) = self.segments.pop_front() else {
            self.current.clear();
            self.current_count = 0;
            return Ok(None);
        };
        self.current_count = u32::try_from(segment.entries.len()).unwrap_or(u32::MAX);
        self.current = segment.entries.into();
        Ok(Some(segment.epoch))
    }

    fn count(&self) -> u32 {
        self.current_count
    }

    fn next(&mut self) -> Result<Option<Vec<u8>>, WalError> {
        Ok(self.current.pop_front())
    }
}
