//! `gridlite-model` defines the in-memory catalog data model for Gridlite
//! documents: tables, columns, display formats, and footer summaries.
//!
//! The crate is intentionally free of any database dependency so the same
//! types can be reused by:
//! - the storage/compilation engine (`gridlite-storage`)
//! - UI and export layers via `serde` (JSON-safe schema)
//!
//! Tables and columns are plain fixed-field structs. The storage layer
//! rebuilds them from the catalog on every update rather than mutating them
//! in place, so holding on to one across a schema change only means holding
//! a stale snapshot, never corrupt shared state.

mod column;
mod error;
mod table;

pub use column::{Alignment, Column, ColumnFormat, Summary};
pub use error::ModelError;
pub use table::{Table, TableKind};
