//! # flowr-storage
//!
//! Storage layer for flowr.
//!
//! This crate provides:
//! - The `RecordStore` boundary the engine persists through
//! - An in-memory store for tests and ephemeral use
//! - A file-backed store with per-record checksums and atomic replacement

pub mod error;
pub mod file;
pub mod memory;
pub mod record;

pub use error::StoreError;
pub use file::{FileStore, FsyncPolicy, StoreConfig};
pub use memory::MemoryStore;
pub use record::{RecordKind, RecordStore};
