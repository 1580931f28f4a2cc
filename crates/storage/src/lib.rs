//! Embedded, file-backed document store for strongroom.
//!
//! This crate keeps named collections of JSON documents in memory and writes
//! each one back to its own file, optionally encrypted. It is the persistence
//! layer underneath the access-control model: roles, groups and actions are
//! ordinary documents living in the same store as business data.
//!
//! # Overview
//!
//! The store is built from a few pieces:
//!
//! 1. **Schemas** describe the shape of documents: field kinds, defaults,
//!    transient fields and a validity predicate (usually a unique key).
//!
//! 2. **Tables** hold the documents of one schema in insertion order and
//!    assign monotonically increasing ids that are never reused.
//!
//! 3. **The document store** maps table names to tables, loads every table
//!    file at boot, and queues write-backs after each successful mutation.
//!
//! # Core Concepts
//!
//! ## DocumentStore
//!
//! The [`DocumentStore`] is the primary interface. CRUD calls are
//! synchronous against memory; disk I/O runs on a background queue. Every
//! successful `set`/`update`/`delete` schedules a write-back of its table,
//! and an autosave timer periodically writes everything.
//!
//! Operations on unknown tables never fail loudly: `get` returns an empty
//! list, `first` and `set` return `None`, `update` and `delete` return
//! `false`. Use [`DocumentStore::has_table`] to tell the cases apart.
//!
//! ## On-disk format
//!
//! One file per table, `<table>.json` or `<table>.cryson` when encryption
//! is on, containing `{"__model__": "<Schema>", "__data__": [...]}`.
//! Encrypted files hold the hex-encoded AES-CBC ciphertext of that JSON.
//!
//! ## Query
//!
//! A [`Query`] bundles an optional filter, ordering and projection, applied
//! in that order.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Document, DocumentStore, FieldKind, Query, Schema, SchemaRegistry, StoreConfig};
//!
//! # async fn example() -> storage::Result<()> {
//! let schemas = SchemaRegistry::new().with(
//!     Schema::builder("Widget")
//!         .id()
//!         .field("name", FieldKind::String)
//!         .unique(&["name"])
//!         .build(),
//! );
//! let store = DocumentStore::open(StoreConfig::default().with_dir("data"), schemas).await?;
//! store.ready().await;
//!
//! store.new_table_with("widgets", "Widget");
//! let widget = store.set("widgets", &Document::new().with("name", "a"));
//! assert_eq!(widget.and_then(|w| w.id()), Some(1));
//!
//! let all = store.get("widgets", &Query::all());
//! println!("{} widgets", all.len());
//!
//! store.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Re-exports
//!
//! - [`DocumentStore`], [`LoadReport`], [`TableInfo`], [`WriteTicket`]: store interface
//! - [`Table`], [`Query`]: in-memory tables
//! - [`Document`]: records
//! - [`Schema`], [`SchemaBuilder`], [`SchemaRegistry`], [`SchemaDecl`]: schemas
//! - [`StoreConfig`], [`Algorithm`], [`Cipher`]: configuration and encryption
//! - [`StoreEvent`]: notifications
//! - [`Error`], [`Result`]: error handling

mod cipher;
mod config;
mod document;
mod error;
mod event;
mod persist;
mod schema;
mod store;
mod table;

pub use cipher::{Algorithm, Cipher};
pub use config::StoreConfig;
pub use document::{Document, ID_FIELD};
pub use error::{Error, Result};
pub use event::StoreEvent;
pub use persist::WriteTicket;
pub use schema::{
    DefaultValue, Field, FieldDecl, FieldKind, Generator, Schema, SchemaBuilder, SchemaDecl,
    SchemaRegistry, Validity,
};
pub use store::{DocumentStore, LoadReport, TableInfo};
pub use table::{Query, Table};
