//! # WeftDB Core
//!
//! Relational semantics over a transactional key-value storage engine.
//!
//! The engine (see `weftdb_engine`) natively offers single-collection
//! CRUD, cursors, and secondary-index range scans. This crate overlays
//! the parts that make relational behavior correct under concurrency:
//!
//! - [`TransactionContext`] / [`TransactionScheduler`] - staged-commit
//!   orchestration: keyed pre-commit callbacks, post-commit callbacks,
//!   terminal-signal settlement, and nested scope reuse
//! - [`CursorScanner`] / [`RecordStream`] - pull-style scanning over the
//!   engine's stepwise cursor protocol
//! - [`ReferentialIntegrityEnforcer`] - foreign-key validation on writes
//!   and cascade / restrict / set-null / no-action delete policies
//! - [`RelationResolver`] - simulated joins via grouped cursor scans with
//!   cardinality-correct shaping and nested population
//! - [`LiveQuery`] - cached reads with automatic, dependency-tracked
//!   invalidation through the [`ChangeHub`]
//! - [`Database`] - the facade wiring it all together
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use weftdb_codec::{Key, KeyPath, Record};
//! use weftdb_core::{
//!     CollectionDef, Database, ForeignKeyRule, OnDelete, RelationDef, Schema, WithSpec,
//! };
//! use weftdb_engine::MemoryEngine;
//!
//! let schema = Schema::new()
//!     .collection(
//!         CollectionDef::new("users")
//!             .key_path(KeyPath::single("id"))
//!             .relation(RelationDef::one_to_many("posts", "users", "id", "posts", "userId")),
//!     )
//!     .collection(
//!         CollectionDef::new("posts")
//!             .key_path(KeyPath::single("id"))
//!             .foreign_key(ForeignKeyRule::new("userId", "users").on_delete(OnDelete::Cascade)),
//!     );
//!
//! let db = Database::open(Arc::new(MemoryEngine::new()), schema).unwrap();
//! db.insert("users", &Record::new().with("id", 1).with("name", "Ada")).unwrap();
//! db.insert("posts", &Record::new().with("id", 10).with("userId", 1)).unwrap();
//!
//! let users = db.find("users", &WithSpec::names(["posts"])).unwrap();
//! assert_eq!(users[0].relation("posts").unwrap().as_many().len(), 1);
//!
//! // Deleting the user cascades to the post.
//! db.delete("users", &Key::Integer(1)).unwrap();
//! assert_eq!(db.count("posts").unwrap(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod hub;
mod integrity;
mod live;
mod resolve;
mod scan;
mod schema;
mod txn;

pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use hub::{ChangeHub, WatcherId};
pub use integrity::ReferentialIntegrityEnforcer;
pub use live::{LiveQuery, SubscriptionId};
pub use resolve::{
    RecordFilter, RelationResolver, ResolvedRecord, ResolvedRelation, WithOptions, WithSpec,
};
pub use scan::{CursorScanner, RecordStream};
pub use schema::{
    Cardinality, CollectionDef, ForeignKeyRule, OnDelete, RelationDef, Schema,
};
pub use txn::{ScopeState, TransactionContext, TransactionScheduler};
