//! Store implementations for the lastmile engine.
//!
//! Two interchangeable [`lastmile_domain::ParcelStore`] backends:
//! - [`MemoryStore`] for tests and ephemeral tooling
//! - [`SqliteStore`] for the warehouse station (WAL-mode SQLite)
//!
//! Both implement the composite guarded operations (`commit_sort`,
//! `commit_unsort`) atomically: under one lock for the memory store,
//! inside one guarded UPDATE for SQLite.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
