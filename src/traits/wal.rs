//! Write-ahead log collaborator traits

use async_trait::async_trait;

use crate::error::WalError;

/// Handle to an open write-ahead log
///
/// Implementations manage their own internal synchronization; the adapter
/// shares one handle across flushes and recovery.
#[async_trait]
pub trait WriteAheadLog: Send + Sync {
    /// Start a new write transaction
    async fn new_writer(&self) -> Result<Box<dyn LogWriter>, WalError>;

    /// Sequential reader over every committed, unapplied segment
    async fn new_reader(&self) -> Result<Box<dyn LogReader>, WalError>;

    /// Mark every segment with epoch <= `epoch` as applied to the primary engine
    async fn signal_log_applied(&self, epoch: i64) -> Result<(), WalError>;

    /// Release the log
    async fn close(&self) -> Result<(), WalError>;
}

/// One write transaction
#[async_trait]
pub trait LogWriter: Send {
    /// Append a record body to the transaction
    async fn append(&mut self, entry: &[u8]) -> Result<(), WalError>;

    /// End the transaction, tagging its entries with `epoch`
    async fn signal_init_write(&mut self, epoch: i64) -> Result<(), WalError>;
}

/// Walks stored segments oldest to newest
pub trait LogReader: Send {
    /// Advance to the next segment, returning its epoch
    fn next_segment(&mut self) -> Result<Option<i64>, WalError>;

    /// Entries in the current segment
    fn count(&self) -> u32;

    /// Next entry in the current segment
    fn next(&mut self) -> Result<Option<Vec<u8>>, WalError>;
}
