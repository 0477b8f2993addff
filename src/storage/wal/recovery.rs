//! Message log scanning after restart
//!
//! Implements the recovery decision tree:
//! - Entries followed by an `INIT_WRITE` marker form a committed segment
//! - Entries with no closing marker were never acknowledged and are dropped
//! - A truncated or corrupt frame ends the scan (torn tail)
//! - Segments at or below the highest `APPLIED` epoch need no replay

use std::collections::VecDeque;

use crate::storage::wal::format::{check_header, Frame, FrameError, HEADER_SIZE};

/// Committed group of entries sharing one epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Epoch from the closing `INIT_WRITE` marker
    pub epoch: i64,

    /// Record bodies in append order
    pub entries: Vec<Vec<u8>>,
}

/// Result of scanning a log file
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    /// Committed segments in file order
    pub segments: Vec<Segment>,

    /// Highest applied epoch seen
    pub applied: Option<i64>,

    /// Bytes up to the last marker; everything after is dropped on open
    pub valid_len: u64,

    /// Entries after the last marker that were discarded
    pub uncommitted: usize,

    /// Scan stopped at a truncated or corrupt frame
    pub torn: Option<FrameError>,
}

impl LogScan {
    /// Scan a whole log file image
    ///
    /// # Errors
    ///
    /// Returns a description of the header mismatch if `buf` is not a log file
    pub fn scan(buf: &[u8]) -> Result<Self, String> {
        check_header(buf)?;

        let mut result = LogScan {
            valid_len: HEADER_SIZE as u64,
            ..Default::default()
        };
        let mut open_entries = Vec::new();
        let mut offset = HEADER_SIZE;

        loop {
            match Frame::decode(&buf[offset..]) {
                Ok(Some((frame, used))) => {
                    offset += used;
                    match frame {
                        Frame::Entry(body) => open_entries.push(body),
                        Frame::InitWrite(epoch) => {
                            result.segments.push(Segment {
                                epoch,
                                entries: std::mem::take(&mut open_entries),
                            });
                            result.valid_len = offset as u64;
                        }
                        Frame::Applied(epoch) => {
                            result.applied = Some(result.applied.map_or(epoch, |a| a.max(epoch)));
                            result.valid_len = offset as u64;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    result.torn = Some(e);
                    break;
                }
            }
        }

        result.uncommitted = open_entries.len();
        Ok(result)
    }

    /// Highest committed segment epoch
    #[must_use]
    pub fn max_committed(&self) -> Option<i64> {
        self.segments.iter().map(|s| s.epoch).max()
    }

    fn is_unapplied(applied: Option<i64>, segment: &Segment) -> bool {
        !segment.entries.is_empty() && applied.map_or(true, |a| segment.epoch > a)
    }

    /// True if any non-empty committed segment is above the applied watermark
    #[must_use]
    pub fn needs_recovery(&self) -> bool {
        self.segments
            .iter()
            .any(|s| Self::is_unapplied(self.applied, s))
    }

    /// Non-empty committed segments above the applied watermark, oldest first
    #[must_use]
    pub fn into_unapplied(self) -> VecDeque<Segment> {
        let applied = self.applied;
        self.segments
            .into_iter()
            .filter(|s| Self::is_unapplied(applied, s))
            .collect()
    }
}
