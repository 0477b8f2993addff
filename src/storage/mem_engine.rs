//! In-memory message engine

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::traits::MessageEngine;

#[derive(Debug, Default)]
struct EngineState {
    blocks: HashMap<u64, BTreeMap<u64, Vec<u8>>>,

    /// Payload bytes currently stored
    used: u64,

    closed: bool,
}

/// Messages held in memory, grouped by block id
///
/// Stored payload bytes are bounded by the capacity given at open.
#[derive(Debug)]
pub struct MemEngine {
    capacity: u64,
    state: RwLock<EngineState>,
}

impl MemEngine {
    /// Engine holding at most `capacity` payload bytes
    #[must_use]
    pub fn open(capacity: u64) -> Self {
        Self {
            capacity,
            state: RwLock::new(EngineState::default()),
        }
    }

    /// Payload bytes currently stored
    #[must_use]
    pub fn used(&self) -> u64 {
        self.read().used
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageEngine for MemEngine {
    async fn set(&self, block_id: u64, key: u64, payload: &[u8]) -> Result<(), EngineError> {
        let mut state = self.write();
        if state.closed {
            return Err(EngineError::Closed);
        }

        let replaced = state
            .blocks
            .get(&block_id)
            .and_then(|block| block.get(&key))
            .map_or(0, |old| old.len() as u64);
        let used = state.used - replaced + payload.len() as u64;
        if used > self.capacity {
            return Err(EngineError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        state
            .blocks
            .entry(block_id)
            .or_default()
            .insert(key, payload.to_vec());
        state.used = used;
        Ok(())
    }

    async fn get(&self, block_id: u64, key: u64) -> Result<Vec<u8>, EngineError> {
        let state = self.read();
        if state.closed {
            return Err(EngineError::Closed);
        }
        state
            .blocks
            .get(&block_id)
            .and_then(|block| block.get(&key))
            .cloned()
            .ok_or(EngineError::NotFound { block_id, key })
    }

    async fn remove(&self, block_id: u64, key: u64) -> Result<(), EngineError> {
        let mut state = self.write();
        if state.closed {
            return Err(EngineError::Closed);
        }

        let block = state
            .blocks
            .get_mut(&block_id)
            .ok_or(EngineError::NotFound { block_id, key })?;
        let removed = block
            .remove(&key)
            .ok_or(EngineError::NotFound { block_id, key })?;
        if block.is_empty() {
            state.blocks.remove(&block_id);
        }
        state.used -= removed.len() as u64;
        Ok(())
    }

    async fn keys(&self, block_id: u64) -> Vec<u64> {
        let state = self.read();
        if state.closed {
            return Vec::new();
        }
        state
            .blocks
            .get(&block_id)
            .map(|block| block.keys().copied().collect())
            .unwrap_or_default()
    }

    async fn close(&self) -> Result<(), EngineError> {
        let mut state = self.write();
        state.blocks.clear();
        state.used = 0;
        state.closed = true;
        Ok(())
    }
}
