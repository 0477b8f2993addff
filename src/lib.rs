//! unitdb-adapter: tiny-batch write-ahead log adapter for the unitdb message store
//!
//! Client writes are encoded into a tiny batch, flushed synchronously to a
//! write-ahead log one flush at a time, and replayed from the log on startup
//! to recover writes that were logged but not yet applied to the primary
//! key-value engine.

pub mod adapter;
pub mod batch;
pub mod config;
pub mod error;
pub mod storage;
pub mod traits;

// Re-exports
pub use adapter::{Adapter, DB_VERSION};
pub use config::{AdapterConfig, ADAPTER_NAME, MAX_RESULTS, MAX_TTL};
pub use error::{AdapterError, AdapterResult};
pub use traits::{LogReader, LogWriter, MessageEngine, MessageStore, PendingWrites, WriteAheadLog};
