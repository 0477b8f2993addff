//! Message store adapter trait

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::AdapterConfig;
use crate::error::AdapterResult;

/// Keys and payloads recovered from the log, not yet confirmed applied
pub type PendingWrites = HashMap<u64, Vec<u8>>;

/// Interface store-selection code holds as `Arc<dyn MessageStore>`
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Name the adapter is selected by
    fn name(&self) -> &'static str;

    /// Connect to the underlying engine
    async fn open(&self, config: AdapterConfig) -> AdapterResult<()>;

    /// Close the engine and log
    async fn close(&self) -> AdapterResult<()>;

    /// True once `open` succeeded; does not check that the engine is live
    fn is_open(&self) -> bool;

    /// Store a message directly in the engine
    async fn put_message(&self, block_id: u64, key: u64, payload: &[u8]) -> AdapterResult<()>;

    /// Fetch a message directly from the engine
    async fn get_message(&self, block_id: u64, key: u64) -> AdapterResult<Vec<u8>>;

    /// Delete a message directly from the engine
    async fn delete_message(&self, block_id: u64, key: u64) -> AdapterResult<()>;

    /// Keys stored under `block_id`, at most `MAX_RESULTS`
    async fn keys(&self, block_id: u64) -> AdapterResult<Vec<u64>>;

    /// Buffer a write for the next flush
    fn append(&self, delete: bool, key: u64, payload: &[u8]) -> AdapterResult<()>;

    /// Flush buffered writes to the log
    async fn write(&self) -> AdapterResult<()>;

    /// Open the log and rebuild writes that were logged but not applied
    async fn recovery(&self, reset: bool) -> AdapterResult<PendingWrites>;
}
