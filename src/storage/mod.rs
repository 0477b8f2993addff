//! Bundled collaborator implementations
//!
//! The adapter only depends on the traits in [`crate::traits`]; these are the
//! engine and log it uses when none are injected.

pub mod mem_engine;
pub mod wal;

pub use mem_engine::MemEngine;
pub use wal::{FileWal, WalOptions};
