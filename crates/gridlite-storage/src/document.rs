//! The document aggregate root: owns the connection, the live table list,
//! and the change-notification lists.

use std::path::Path;
use std::time::Duration;

use gridlite_model::{ColumnFormat, Summary, Table, TableKind};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::error::{expect_one, Result, StorageError};
use crate::sql::{formatted_view_name, quote_ident, quote_idents};
use crate::{catalog, mutate, schema, views};

/// One opened Gridlite database.
///
/// Opening runs `import` (a one-time VACUUM so physical rowids are
/// contiguous, then catalog bootstrap-or-migrate) followed by the first
/// `update`. The table list is a snapshot rebuilt from the catalog on every
/// update; structural mutations go through the methods here, which re-run
/// `update` and fire the schema observers.
///
/// The connection is exclusively owned: everything is synchronous and
/// single-threaded by design.
pub struct Document {
    conn: Connection,
    tables: Vec<Table>,
    schema_observers: Vec<Box<dyn FnMut()>>,
    data_observers: Vec<Box<dyn FnMut()>>,
}

impl Document {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::open_connection(conn)
    }

    /// Open a caller-prepared connection. This is the entry point for import
    /// collaborators that seed physical tables (e.g. from CSV) before the
    /// catalog exists.
    pub fn open_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let mut doc = Document {
            conn,
            tables: Vec::new(),
            schema_observers: Vec::new(),
            data_observers: Vec::new(),
        };
        doc.import()?;
        doc.update()?;
        Ok(doc)
    }

    /// Create a brand-new in-memory document seeded with an empty starter
    /// table (a catalog with zero tables is not a valid document).
    pub fn create_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        seed_starter_table(&conn)?;
        Self::open_connection(conn)
    }

    /// Create a brand-new document file, seeded like [`Self::create_in_memory`].
    pub fn create_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        seed_starter_table(&conn)?;
        Self::open_connection(conn)
    }

    fn import(&mut self) -> Result<()> {
        // Contiguous rowids are a precondition for the row-reorder scheme.
        self.conn.execute_batch("VACUUM")?;
        if schema::catalog_exists(&self.conn)? {
            schema::migrate(&mut self.conn)?;
        } else {
            schema::bootstrap(&mut self.conn)?;
        }
        let registered: i64 =
            self.conn
                .query_row("SELECT count(*) FROM gridlite_table", [], |row| row.get(0))?;
        if registered == 0 {
            return Err(StorageError::EmptyDocument);
        }
        Ok(())
    }

    /// Reload the table list from the catalog and recompile every table's
    /// `_raw`/`_formatted` views.
    pub fn update(&mut self) -> Result<()> {
        self.tables = catalog::load_tables(&self.conn)?;
        for table in &self.tables {
            views::compile_views(&self.conn, table)?;
        }
        Ok(())
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn table_snapshot(&self, name: &str) -> Result<Table> {
        self.table(name).cloned()
    }

    // ---- observers -------------------------------------------------------

    /// Subscribe to structural changes (any mutation below, and `update`).
    pub fn on_schema_change(&mut self, observer: impl FnMut() + 'static) {
        self.schema_observers.push(Box::new(observer));
    }

    /// Subscribe to plain data edits.
    pub fn on_data_change(&mut self, observer: impl FnMut() + 'static) {
        self.data_observers.push(Box::new(observer));
    }

    /// Fire the data observers. Collaborators call this after editing rows
    /// through their own statements.
    pub fn notify_data_change(&mut self) {
        for observer in &mut self.data_observers {
            observer();
        }
    }

    fn after_schema_change(&mut self) -> Result<()> {
        self.update()?;
        for observer in &mut self.schema_observers {
            observer();
        }
        Ok(())
    }

    // ---- structural mutation ----------------------------------------------

    pub fn add_column(&mut self, table: &str, name: &str, formula: Option<&str>) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::add_column(&mut self.conn, &snapshot, name, formula)?;
        self.after_schema_change()
    }

    pub fn add_column_with_default_name(&mut self, table: &str, base: &str) -> Result<String> {
        let snapshot = self.table_snapshot(table)?;
        let name = mutate::add_column_with_default_name(&mut self.conn, &snapshot, base)?;
        self.after_schema_change()?;
        Ok(name)
    }

    pub fn drop_column(&mut self, table: &str, name: &str) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::drop_column(&mut self.conn, &snapshot, name)?;
        self.after_schema_change()
    }

    pub fn rename_column(&mut self, table: &str, position: i64, new_name: &str) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::rename_column(&mut self.conn, &snapshot, position, new_name)?;
        self.after_schema_change()
    }

    pub fn rename_table(&mut self, table: &str, new_name: &str) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::rename_table(&mut self.conn, &snapshot, new_name)?;
        self.after_schema_change()
    }

    pub fn drop_table(&mut self, table: &str) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::drop_table(&mut self.conn, &snapshot)?;
        self.after_schema_change()
    }

    pub fn move_column(&mut self, table: &str, from: i64, to: i64) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::move_column(&mut self.conn, &snapshot, from, to)?;
        self.after_schema_change()
    }

    pub fn move_row(&mut self, table: &str, from: i64, to: i64) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::move_row(&mut self.conn, &snapshot, from, to)?;
        self.after_schema_change()
    }

    /// Rewrite physical rowids to match the table's `order_by`. The table
    /// must have one set.
    pub fn sort_rowids(&mut self, table: &str) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::sort_rowids(&mut self.conn, &snapshot)?;
        self.after_schema_change()
    }

    /// Replace the SQL source of a `view`/`pivot` table.
    pub fn set_source(&mut self, table: &str, source: &str) -> Result<()> {
        let snapshot = self.table_snapshot(table)?;
        mutate::set_source(&mut self.conn, &snapshot, source)?;
        self.after_schema_change()
    }

    /// Register an already-existing physical table or view with the catalog.
    pub fn register_table(&mut self, name: &str, kind: TableKind) -> Result<()> {
        catalog::register_table(&self.conn, name, kind)?;
        self.after_schema_change()
    }

    /// Seed a brand-new physical table from a tabular source (field names
    /// plus value rows), register it and recompile. The import collaborator
    /// is responsible for parsing; this end only stores.
    pub fn import_table(&mut self, name: &str, fields: &[&str], rows: &[Vec<Value>]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(name),
            quote_idents(fields.iter().copied())
        ))?;
        {
            let placeholders = (1..=fields.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({placeholders})",
                quote_ident(name)
            ))?;
            for row in rows {
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        catalog::register_table(&tx, name, TableKind::Table)?;
        tx.commit()?;
        self.after_schema_change()
    }

    // ---- column metadata --------------------------------------------------

    pub fn set_column_format(
        &mut self,
        table: &str,
        column: &str,
        format: Option<ColumnFormat>,
        precision: Option<u32>,
    ) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE gridlite_column SET format = ?1, precision = ?2
             WHERE table_name = ?3 AND name = ?4",
            params![format.map(ColumnFormat::as_str), precision, table, column],
        )?;
        expect_one(affected, "set_column_format")?;
        self.after_schema_change()
    }

    pub fn set_column_summary(
        &mut self,
        table: &str,
        column: &str,
        summary: Option<Summary>,
    ) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE gridlite_column SET summary = ?1 WHERE table_name = ?2 AND name = ?3",
            params![summary.map(Summary::as_str), table, column],
        )?;
        expect_one(affected, "set_column_summary")?;
        self.after_schema_change()
    }

    /// Set or clear a column's formula. Only catalog state changes; whether
    /// the new formula resolves is decided by the recompilation this
    /// triggers, and a failure there surfaces from this call.
    pub fn set_column_formula(
        &mut self,
        table: &str,
        column: &str,
        formula: Option<&str>,
    ) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE gridlite_column SET formula = ?1 WHERE table_name = ?2 AND name = ?3",
            params![formula, table, column],
        )?;
        expect_one(affected, "set_column_formula")?;
        self.after_schema_change()
    }

    pub fn set_column_width(&mut self, table: &str, column: &str, width: Option<i64>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE gridlite_column SET width = ?1 WHERE table_name = ?2 AND name = ?3",
            params![width, table, column],
        )?;
        expect_one(affected, "set_column_width")?;
        self.after_schema_change()
    }

    pub fn set_order_by(&mut self, table: &str, order_by: Option<&str>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE gridlite_table SET order_by = ?1 WHERE table_name = ?2",
            params![order_by, table],
        )?;
        expect_one(affected, "set_order_by")?;
        self.after_schema_change()
    }

    // ---- data --------------------------------------------------------------

    /// Run one data statement (no schema change) and fire the data observers.
    pub fn execute_data(&mut self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        let affected = self.conn.execute(sql, params)?;
        self.notify_data_change();
        Ok(affected)
    }

    /// Run an arbitrary read query and collect every row as a `Vec` of
    /// values. The grid collaborator reads the generated views through this.
    pub fn query_rows(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let rows = stmt.query_map(params, |row| {
            (0..column_count)
                .map(|i| row.get(i))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Read a table's formatted view back, rowid first, one `Vec` per row
    /// (footer included when present). This is what export collaborators
    /// consume.
    pub fn formatted_rows(&self, table: &str) -> Result<Vec<Vec<Value>>> {
        let table = self.table(table)?;
        self.query_rows(
            &format!(
                "SELECT * FROM {}",
                quote_ident(&formatted_view_name(&table.name))
            ),
            [],
        )
    }

    // ---- document metadata --------------------------------------------------

    pub fn version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT api_version FROM gridlite_document", [], |row| {
                row.get(0)
            })?)
    }

    pub fn author(&self) -> Result<Option<String>> {
        self.document_field("author")
    }

    pub fn set_author(&mut self, author: Option<&str>) -> Result<()> {
        self.set_document_field("author", author)
    }

    pub fn license(&self) -> Result<Option<String>> {
        self.document_field("license")
    }

    pub fn set_license(&mut self, license: Option<&str>) -> Result<()> {
        self.set_document_field("license", license)
    }

    pub fn description(&self) -> Result<Option<String>> {
        self.document_field("description")
    }

    pub fn set_description(&mut self, description: Option<&str>) -> Result<()> {
        self.set_document_field("description", description)
    }

    fn document_field(&self, field: &'static str) -> Result<Option<String>> {
        Ok(self.conn.query_row(
            &format!("SELECT {field} FROM gridlite_document"),
            [],
            |row| row.get(0),
        )?)
    }

    fn set_document_field(&mut self, field: &'static str, value: Option<&str>) -> Result<()> {
        let affected = self.conn.execute(
            &format!("UPDATE gridlite_document SET {field} = ?1"),
            params![value],
        )?;
        expect_one(affected, "set document metadata")?;
        self.notify_data_change();
        Ok(())
    }
}

fn seed_starter_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE table1 (col1, col2, col3);
         INSERT INTO table1 (col1) VALUES (NULL), (NULL), (NULL);",
    )
}
