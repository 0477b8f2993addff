//! Tiny batch: in-memory accumulation of encoded write records
//!
//! Records are encoded by [`record`] into a single append-only buffer owned by
//! [`TinyBatch`]. The flush path drains that buffer into the write-ahead log,
//! tagging each flush with a write epoch from [`epoch`].

mod epoch;
mod record;
mod tiny_batch;

pub use epoch::EpochClock;
pub use record::{
    decode_body, encode_into, encoded_len, LogRecord, RecordIter, RecordRef, BODY_HEADER_SIZE,
    DELETE_FLAG, LENGTH_PREFIX_SIZE, RECORD_OVERHEAD, SET_FLAG,
};
pub use tiny_batch::{DrainedBatch, TinyBatch};
