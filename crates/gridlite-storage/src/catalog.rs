//! Catalog queries: registering tables and rebuilding the model from the
//! system relations.

use gridlite_model::{Column, ColumnFormat, Summary, Table, TableKind};
use rusqlite::{params, Connection};

use crate::error::Result;

/// Insert a registry row for `name` if none exists, then append a column row
/// (`position = max + 1`, or 0 for the first) for every physical column not
/// yet present in the registry. Formula columns have no physical counterpart
/// and are never touched here.
pub(crate) fn register_table(conn: &Connection, name: &str, kind: TableKind) -> Result<()> {
    conn.execute(
        "INSERT INTO gridlite_table (table_name, type)
         SELECT ?1, ?2
         WHERE NOT EXISTS (SELECT 1 FROM gridlite_table WHERE table_name = ?1)",
        params![name, kind.as_str()],
    )?;

    let physical: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = stmt.query_map(params![name], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for column in physical {
        conn.execute(
            "INSERT INTO gridlite_column (table_name, name, position)
             SELECT ?1, ?2, COALESCE(
                 (SELECT max(position) + 1 FROM gridlite_column WHERE table_name = ?1), 0)
             WHERE NOT EXISTS (
                 SELECT 1 FROM gridlite_column WHERE table_name = ?1 AND name = ?2)",
            params![name, column],
        )?;
    }

    Ok(())
}

/// Rebuild the full table list from the catalog, columns in position order.
/// Unknown format/summary/type text fails here, before any view is compiled.
pub(crate) fn load_tables(conn: &Connection) -> Result<Vec<Table>> {
    let metas: Vec<(String, String, Option<String>, Option<String>)> = {
        let mut stmt = conn.prepare(
            "SELECT table_name, type, description, order_by
             FROM gridlite_table ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut tables = Vec::with_capacity(metas.len());
    for (name, kind, description, order_by) in metas {
        let mut table = Table::new(name, TableKind::parse(&kind)?);
        table.description = description;
        table.order_by = order_by;
        table.columns = load_columns(conn, &table.name)?;
        tables.push(table);
    }
    Ok(tables)
}

fn load_columns(conn: &Connection, table_name: &str) -> Result<Vec<Column>> {
    let raw: Vec<(
        String,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<i64>,
        Option<u32>,
    )> = {
        let mut stmt = conn.prepare(
            "SELECT name, position, format, summary, formula, description, width, precision
             FROM gridlite_column WHERE table_name = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![table_name], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut columns = Vec::with_capacity(raw.len());
    for (name, position, format, summary, formula, description, width, precision) in raw {
        let mut column = Column::new(name, position);
        column.format = format.as_deref().map(ColumnFormat::parse).transpose()?;
        column.summary = summary.as_deref().map(Summary::parse).transpose()?;
        column.formula = formula;
        column.description = description;
        column.width = width;
        column.precision = precision;
        columns.push(column);
    }
    Ok(columns)
}
