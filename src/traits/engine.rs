//! Key-value engine collaborator trait

use async_trait::async_trait;

use crate::error::EngineError;

/// Primary message storage keyed by block id and message key
#[async_trait]
pub trait MessageEngine: Send + Sync {
    /// Store `payload` under (`block_id`, `key`), replacing any previous value
    async fn set(&self, block_id: u64, key: u64, payload: &[u8]) -> Result<(), EngineError>;

    /// Fetch the payload stored under (`block_id`, `key`)
    async fn get(&self, block_id: u64, key: u64) -> Result<Vec<u8>, EngineError>;

    /// Delete (`block_id`, `key`)
    async fn remove(&self, block_id: u64, key: u64) -> Result<(), EngineError>;

    /// All keys stored under `block_id`
    async fn keys(&self, block_id: u64) -> Vec<u64>;

    /// Release the engine
    async fn close(&self) -> Result<(), EngineError>;
}
