//! Tiny batch accumulator
//!
//! `count()` is an atomic so it never waits on producers. It counts every
//! record not yet committed to the log: records still buffered plus records
//! drained by a flush that has not finished. A flush settles its drained
//! records with [`TinyBatch::complete`] once the log transaction commits, or
//! hands them back with [`TinyBatch::restore`]. Buffer bytes and the buffered
//! count change together under the buffer lock; the flush path only drains,
//! completes or restores while it holds the adapter's write serializer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::batch::record::{encode_into, encoded_len};
use crate::error::BatchError;

/// Bytes and count taken out of a batch for one flush
#[derive(Debug, Default)]
pub struct DrainedBatch {
    /// Length-prefixed records, oldest first
    pub bytes: Vec<u8>,

    /// Number of records in `bytes`
    pub count: u32,
}

impl DrainedBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Default)]
struct Buffer {
    bytes: Vec<u8>,
    count: u32,
}

/// Writes that have not been committed to the log yet
#[derive(Debug)]
pub struct TinyBatch {
    buffer: Mutex<Buffer>,
    unflushed: AtomicU32,
}

impl Default for TinyBatch {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl TinyBatch {
    /// Empty batch with `capacity` bytes preallocated
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                bytes: Vec::with_capacity(capacity),
                count: 0,
            }),
            unflushed: AtomicU32::new(0),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, Buffer> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Encode a record onto the end of the batch
    ///
    /// Nothing is written if the buffer cannot grow.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` if the buffer allocation fails, the payload is too
    /// large for a record, or `u32::MAX` records are already unflushed
    pub fn append(&self, delete: bool, key: u64, payload: &[u8]) -> Result<(), BatchError> {
        let payload = if delete { &[][..] } else { payload };
        let len = encoded_len(payload.len())? as usize;

        let mut buf = self.buffer();
        if self.unflushed.load(Ordering::Acquire) == u32::MAX {
            return Err(BatchError::CountOverflow);
        }
        buf.bytes.try_reserve(len)?;
        encode_into(&mut buf.bytes, delete, key, payload)?;
        buf.count += 1;
        self.unflushed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Make room for at least `capacity` bytes in total
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Alloc` if the buffer cannot grow
    pub fn reserve(&self, capacity: usize) -> Result<(), BatchError> {
        let mut buf = self.buffer();
        if let Some(additional) = capacity.checked_sub(buf.bytes.len()) {
            buf.bytes.try_reserve(additional)?;
        }
        Ok(())
    }

    /// Records not yet committed to the log, including those of a running flush
    #[must_use]
    pub fn count(&self) -> u32 {
        self.unflushed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Encoded bytes waiting in the buffer
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.buffer().bytes.len()
    }

    /// Copy of the buffered bytes
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer().bytes.clone()
    }

    /// Drop every buffered record
    ///
    /// Records already drained by a running flush are not affected.
    pub fn reset(&self) {
        let mut buf = self.buffer();
        buf.bytes.clear();
        self.unflushed.fetch_sub(buf.count, Ordering::AcqRel);
        buf.count = 0;
    }

    /// Take all buffered records; they stay counted until completed or restored
    pub(crate) fn drain(&self) -> DrainedBatch {
        let mut buf = self.buffer();
        let capacity = buf.bytes.capacity();
        let bytes = std::mem::replace(&mut buf.bytes, Vec::with_capacity(capacity.min(4096)));
        let count = std::mem::take(&mut buf.count);
        DrainedBatch { bytes, count }
    }

    /// Put drained records back in front of anything appended since the drain
    pub(crate) fn restore(&self, drained: DrainedBatch) {
        if drained.is_empty() {
            return;
        }
        let mut buf = self.buffer();
        let mut bytes = drained.bytes;
        bytes.extend_from_slice(&buf.bytes);
        buf.bytes = bytes;
        buf.count += drained.count;
    }

    /// Settle records committed to the log and reuse their allocation
    pub(crate) fn complete(&self, drained: DrainedBatch) {
        let mut bytes = drained.bytes;
        bytes.clear();

        let mut buf = self.buffer();
        self.unflushed.fetch_sub(drained.count, Ordering::AcqRel);
        if buf.bytes.is_empty() && bytes.capacity() > buf.bytes.capacity() {
            buf.bytes = bytes;
        }
    }
}
