//! Catalog schema: bootstrap and versioned migration.
//!
//! Three system relations live alongside the user's data in the same file.
//! `gridlite_document` holds the schema version and free-text metadata,
//! `gridlite_table` registers every spreadsheet table/view, and
//! `gridlite_column` carries per-column metadata with a uniqueness
//! constraint on `(table_name, position)` that the reorder algorithms in
//! `mutate` are built around.

use gridlite_model::TableKind;
use rusqlite::{params, Connection};

use crate::catalog;
use crate::error::{Result, StorageError};

/// Version written by [`bootstrap`] and targeted by [`migrate`].
pub const CURRENT_VERSION: i64 = 6;

/// Ordered, version-gated migration steps. Each entry upgrades a document
/// from `target - 1` to `target` with a single additive schema change; the
/// stored version makes every step idempotent across re-opens.
const MIGRATIONS: &[(i64, &str)] = &[
    (2, "ALTER TABLE gridlite_column ADD COLUMN formula TEXT"),
    (3, "ALTER TABLE gridlite_column ADD COLUMN width INTEGER"),
    (4, "ALTER TABLE gridlite_table ADD COLUMN order_by TEXT"),
    (
        5,
        "ALTER TABLE gridlite_table ADD COLUMN type TEXT NOT NULL DEFAULT 'table' \
         CHECK (type IN ('table', 'view', 'pivot'))",
    ),
    (6, "ALTER TABLE gridlite_column ADD COLUMN precision INTEGER"),
];

pub(crate) fn catalog_exists(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'gridlite_document'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Create the catalog at [`CURRENT_VERSION`] and register every user
/// table/view found in the physical schema.
pub(crate) fn bootstrap(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        r#"
        CREATE TABLE gridlite_document (
            api_version INTEGER NOT NULL,
            author      TEXT,
            license     TEXT,
            description TEXT
        );

        CREATE TABLE gridlite_table (
            table_name  TEXT PRIMARY KEY,
            description TEXT,
            order_by    TEXT,
            type        TEXT NOT NULL DEFAULT 'table'
                        CHECK (type IN ('table', 'view', 'pivot'))
        );

        CREATE TABLE gridlite_column (
            table_name  TEXT NOT NULL REFERENCES gridlite_table(table_name)
                        ON DELETE CASCADE ON UPDATE CASCADE,
            name        TEXT NOT NULL,
            position    INTEGER NOT NULL,
            format      TEXT,
            summary     TEXT,
            description TEXT,
            formula     TEXT,
            width       INTEGER,
            precision   INTEGER,
            PRIMARY KEY (table_name, name),
            UNIQUE (table_name, position)
        );
        "#,
    )?;

    tx.execute(
        "INSERT INTO gridlite_document (api_version) VALUES (?1)",
        params![CURRENT_VERSION],
    )?;

    // Register everything that is not ours: system relations and generated
    // views are recognized by naming convention.
    let discovered: Vec<(String, String)> = {
        let mut stmt = tx.prepare(
            r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view')
              AND name NOT LIKE 'gridlite\_%' ESCAPE '\'
              AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
              AND name NOT LIKE '%\_raw' ESCAPE '\'
              AND name NOT LIKE '%\_formatted' ESCAPE '\'
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for (name, kind) in discovered {
        let kind = match kind.as_str() {
            "view" => TableKind::View,
            _ => TableKind::Table,
        };
        catalog::register_table(&tx, &name, kind)?;
    }

    tx.commit()?;
    Ok(())
}

/// Bring an existing catalog up to [`CURRENT_VERSION`], one version-gated
/// step at a time. A stored version newer than this build understands is
/// fatal: the document cannot be opened.
pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    loop {
        let stored: i64 = conn.query_row(
            "SELECT api_version FROM gridlite_document",
            [],
            |row| row.get(0),
        )?;
        if stored == CURRENT_VERSION {
            return Ok(());
        }
        if stored < 1 || stored > CURRENT_VERSION {
            return Err(StorageError::SchemaVersion(stored));
        }

        let (target, ddl) = MIGRATIONS
            .iter()
            .find(|(target, _)| *target == stored + 1)
            .copied()
            .ok_or(StorageError::SchemaVersion(stored))?;

        log::debug!("migrating catalog schema from version {stored} to {target}");
        let tx = conn.transaction()?;
        tx.execute_batch(ddl)?;
        tx.execute(
            "UPDATE gridlite_document SET api_version = ?1",
            params![target],
        )?;
        tx.commit()?;
    }
}
