//! Trait definitions for the adapter and its collaborators

pub mod engine;
pub mod store;
pub mod wal;

pub use engine::MessageEngine;
pub use store::{MessageStore, PendingWrites};
pub use wal::{LogReader, LogWriter, WriteAheadLog};
