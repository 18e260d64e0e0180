//! # talkstate-storage
//!
//! Storage layer for talkstate.
//!
//! This crate provides:
//! - A concurrent talk registry with per-talk locking
//! - Checksummed JSON snapshots of talk records
//! - Pluggable talk identity generation

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StorageError;
pub use snapshot::{SnapshotMeta, SnapshotStore};
pub use store::{IdGenerator, TalkStore, UuidGenerator};
