//! # WeftDB Engine
//!
//! Storage-engine collaborator surface for WeftDB.
//!
//! WeftDB does not implement its own storage engine. This crate defines
//! what it requires from one:
//!
//! - named collections with optional key paths, auto-keys, and secondary
//!   indexes ([`CollectionConfig`], [`IndexConfig`])
//! - atomic scopes over a declared set of collections in read-only or
//!   read-write mode ([`StorageEngine::begin`], [`EngineTransaction`])
//! - per-collection CRUD, cursors, and index range scans inside a scope
//! - key ranges over the ordered key domain ([`KeyRange`])
//!
//! [`MemoryEngine`] is the in-memory reference implementation used by the
//! workspace's tests.
//!
//! ## Example
//!
//! ```
//! use weftdb_codec::{Key, KeyPath, Record};
//! use weftdb_engine::{AccessMode, CollectionConfig, MemoryEngine, StorageEngine};
//!
//! let engine = MemoryEngine::new();
//! engine
//!     .create_collection(CollectionConfig::new("users").key_path(KeyPath::single("id")))
//!     .unwrap();
//!
//! let mut txn = engine.begin(&["users".into()], AccessMode::ReadWrite).unwrap();
//! txn.add("users", None, &Record::new().with("id", 1).with("name", "Ada")).unwrap();
//! txn.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod keyrange;
mod memory;
mod traits;

pub use config::{CollectionConfig, IndexConfig};
pub use error::{EngineError, EngineResult};
pub use keyrange::KeyRange;
pub use memory::MemoryEngine;
pub use traits::{AccessMode, CursorEntry, Direction, EngineCursor, EngineTransaction, StorageEngine};
