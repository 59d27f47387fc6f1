//! SQLite-backed spreadsheet catalog engine for Gridlite documents.
//!
//! A Gridlite document is an ordinary SQLite file whose user tables are
//! annotated with metadata (column order, display format, footer summaries,
//! formula expressions, manual sort order) held in three `gridlite_` catalog
//! relations inside the same file. This crate owns that catalog and exposes:
//! - schema bootstrapping and versioned migration (`schema`)
//! - dependency-aware compilation of `_raw`/`_formatted` views (`views`)
//! - structural mutation that keeps catalog and physical schema in
//!   lock-step (`mutate`)
//! - the [`Document`] aggregate root with synchronous change notification
//!
//! Everything is single-threaded and synchronous: one `Document` exclusively
//! owns one connection for its lifetime, and every operation either lands
//! completely or leaves the prior state intact.

mod catalog;
mod document;
mod error;
pub mod mutate;
mod schema;
mod sql;
mod views;

pub use document::Document;
pub use error::{Result, StorageError};
pub use schema::CURRENT_VERSION;
