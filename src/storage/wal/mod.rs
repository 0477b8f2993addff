//! Write-ahead log for batched message writes
//!
//! Key properties:
//! - One append-only file
//! - Single fsync per committed segment (not per entry)
//! - CRC32 checksums on every frame
//! - Epoch markers for commit and apply watermarks

mod format;
mod reader;
mod recovery;
mod writer;

pub use format::{Frame, FrameError, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};
pub use reader::FileLogReader;
pub use recovery::{LogScan, Segment};
pub use writer::{FileLogWriter, FileWal, WalOptions};
