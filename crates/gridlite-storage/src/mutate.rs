//! Structural mutation: every operation here changes the catalog and the
//! physical schema together, inside one transaction, so a failure leaves the
//! prior state intact.
//!
//! Ordinal reordering (`move_column`, `move_row`, `renumber_positions`,
//! `sort_rowids`) works against a uniqueness constraint that SQLite checks
//! after every row of a multi-row UPDATE, not at statement end. The safe
//! technique is two-phase: first shift every new value by an offset larger
//! than any live value (derived from the live maximum, so it can never
//! collide), then subtract the offset back out in a second UPDATE.

use std::collections::HashSet;

use gridlite_model::{Table, TableKind};
use rusqlite::{params, Connection, Transaction};

use crate::catalog;
use crate::error::{expect_one, Result, StorageError};
use crate::sql::{formatted_view_name, quote_ident, quote_idents, raw_view_name};

/// Temporary name used while rebuilding a table. Carries the system prefix so
/// it can never collide with (or be registered as) a user table.
const REBUILD_TMP: &str = "gridlite_rebuild_tmp";

/// Add a column. Non-formula columns get a physical `ADD COLUMN`; the
/// registry row always lands at the end of the position range.
pub(crate) fn add_column(
    conn: &mut Connection,
    table: &Table,
    name: &str,
    formula: Option<&str>,
) -> Result<()> {
    let tx = conn.transaction()?;
    if formula.is_none() {
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(&table.name),
            quote_ident(name)
        ))?;
    }
    let affected = tx.execute(
        "INSERT INTO gridlite_column (table_name, name, position, formula)
         VALUES (?1, ?2, COALESCE(
             (SELECT max(position) + 1 FROM gridlite_column WHERE table_name = ?1), 0), ?3)",
        params![table.name, name, formula],
    )?;
    expect_one(affected, "add_column registry insert")?;
    tx.commit()?;
    Ok(())
}

/// Add a column named `<base><n>` for the smallest `n >= 1` not already taken
/// by an existing column. Returns the chosen name.
pub(crate) fn add_column_with_default_name(
    conn: &mut Connection,
    table: &Table,
    base: &str,
) -> Result<String> {
    let used: HashSet<u32> = table
        .columns
        .iter()
        .filter_map(|c| c.name.strip_prefix(base))
        .filter_map(|suffix| suffix.parse().ok())
        .collect();
    let mut n = 1;
    while used.contains(&n) {
        n += 1;
    }
    let name = format!("{base}{n}");
    add_column(conn, table, &name, None)?;
    Ok(name)
}

/// Drop a column. Formula columns exist only in the catalog; non-formula
/// columns are physically removed by rebuilding the table without them
/// (SQLite has no native column drop at the level this targets). Positions
/// are renumbered back to a contiguous `0..n-1` afterwards.
pub(crate) fn drop_column(conn: &mut Connection, table: &Table, name: &str) -> Result<()> {
    let column = table
        .column(name)
        .ok_or_else(|| StorageError::ColumnNotFound {
            table: table.name.clone(),
            column: name.to_string(),
        })?;

    let tx = conn.transaction()?;
    if column.formula.is_none() {
        let keep: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.formula.is_none() && !c.name.eq_ignore_ascii_case(name))
            .map(|c| c.name.as_str())
            .collect();
        rebuild_table(&tx, &table.name, &keep, &keep)?;
    }
    let affected = tx.execute(
        "DELETE FROM gridlite_column WHERE table_name = ?1 AND name = ?2",
        params![table.name, column.name],
    )?;
    expect_one(affected, "drop_column registry delete")?;
    renumber_positions(&tx, &table.name)?;
    tx.commit()?;
    Ok(())
}

/// Rename the column at `position`, committing the enclosing transaction.
pub(crate) fn rename_column(
    conn: &mut Connection,
    table: &Table,
    position: i64,
    new_name: &str,
) -> Result<()> {
    let tx = conn.transaction()?;
    rename_column_tx(&tx, table, position, new_name)?;
    tx.commit()?;
    Ok(())
}

/// Rename the column at `position` inside a caller-owned transaction.
///
/// This is the escape hatch for batched edits: the physical table is rebuilt
/// with the new column name (the engine has no native column rename) and the
/// registry row keyed by `(table_name, position)` is updated, but nothing is
/// committed; the caller decides when, and may interleave further statements
/// first.
pub fn rename_column_tx(
    tx: &Transaction<'_>,
    table: &Table,
    position: i64,
    new_name: &str,
) -> Result<()> {
    let column = table
        .column_at(position)
        .ok_or_else(|| StorageError::ColumnNotFound {
            table: table.name.clone(),
            column: format!("position {position}"),
        })?;

    if column.formula.is_none() {
        let old: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.formula.is_none())
            .map(|c| c.name.as_str())
            .collect();
        let new: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.formula.is_none())
            .map(|c| if c.position == position { new_name } else { c.name.as_str() })
            .collect();
        rebuild_table(tx, &table.name, &new, &old)?;
    }

    let affected = tx.execute(
        "UPDATE gridlite_column SET name = ?1 WHERE table_name = ?2 AND position = ?3",
        params![new_name, table.name, position],
    )?;
    expect_one(affected, "rename_column registry update")?;
    Ok(())
}

/// Rename a table or view, fixing up `table_name` in both catalog relations.
/// The parent row changes before the children, so referential integrity is
/// suspended for the duration (the pragma is a no-op inside a transaction,
/// which is why it brackets one instead of joining it).
pub(crate) fn rename_table(conn: &mut Connection, table: &Table, new_name: &str) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let renamed = rename_table_inner(conn, table, new_name);
    let restored = conn.pragma_update(None, "foreign_keys", "ON");
    renamed?;
    restored?;
    Ok(())
}

fn rename_table_inner(conn: &mut Connection, table: &Table, new_name: &str) -> Result<()> {
    let tx = conn.transaction()?;
    drop_generated_views(&tx, &table.name)?;
    match table.kind {
        TableKind::Table => {
            tx.execute_batch(&format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(&table.name),
                quote_ident(new_name)
            ))?;
        }
        // Views cannot be renamed in place; recreate under the new name.
        TableKind::View | TableKind::Pivot => {
            let body = view_body(&tx, &table.name)?;
            tx.execute_batch(&format!(
                "DROP VIEW {};\nCREATE VIEW {} AS {};",
                quote_ident(&table.name),
                quote_ident(new_name),
                body
            ))?;
        }
    }
    let affected = tx.execute(
        "UPDATE gridlite_table SET table_name = ?1 WHERE table_name = ?2",
        params![new_name, table.name],
    )?;
    expect_one(affected, "rename_table registry update")?;
    tx.execute(
        "UPDATE gridlite_column SET table_name = ?1 WHERE table_name = ?2",
        params![new_name, table.name],
    )?;
    tx.commit()?;
    Ok(())
}

/// Drop a table/view along with its registry row; the column rows follow via
/// the catalog's cascading delete.
pub(crate) fn drop_table(conn: &mut Connection, table: &Table) -> Result<()> {
    let tx = conn.transaction()?;
    drop_generated_views(&tx, &table.name)?;
    let statement = match table.kind {
        TableKind::Table => "DROP TABLE",
        TableKind::View | TableKind::Pivot => "DROP VIEW",
    };
    tx.execute_batch(&format!("{statement} {}", quote_ident(&table.name)))?;
    let affected = tx.execute(
        "DELETE FROM gridlite_table WHERE table_name = ?1",
        params![table.name],
    )?;
    expect_one(affected, "drop_table registry delete")?;
    tx.commit()?;
    Ok(())
}

/// Move the column at position `from` to position `to`; everything strictly
/// between shifts by one to close the gap.
pub(crate) fn move_column(conn: &mut Connection, table: &Table, from: i64, to: i64) -> Result<()> {
    if from == to {
        return Ok(());
    }
    for position in [from, to] {
        if table.column_at(position).is_none() {
            return Err(StorageError::ColumnNotFound {
                table: table.name.clone(),
                column: format!("position {position}"),
            });
        }
    }

    let tx = conn.transaction()?;
    let offset: i64 = tx.query_row(
        "SELECT COALESCE(max(position), -1) + 1 FROM gridlite_column WHERE table_name = ?1",
        params![table.name],
        |row| row.get(0),
    )?;
    let (lo, hi, shift) = if from < to { (from, to, -1) } else { (to, from, 1) };

    tx.execute(
        "UPDATE gridlite_column
         SET position = (CASE WHEN position = ?2 THEN ?3 ELSE position + ?4 END) + ?5
         WHERE table_name = ?1 AND position BETWEEN ?6 AND ?7",
        params![table.name, from, to, shift, offset, lo, hi],
    )?;
    tx.execute(
        "UPDATE gridlite_column SET position = position - ?2
         WHERE table_name = ?1 AND position >= ?2",
        params![table.name, offset],
    )?;
    tx.commit()?;
    Ok(())
}

/// Move the row with rowid `from` to rowid `to`, shifting the rows between.
/// A missing endpoint is not an error: the reorder is dropped with a warning.
/// Manual row order supersedes any sort expression, so `order_by` is cleared.
pub(crate) fn move_row(conn: &mut Connection, table: &Table, from: i64, to: i64) -> Result<()> {
    if from == to {
        return Ok(());
    }
    let tx = conn.transaction()?;
    let quoted = quote_ident(&table.name);

    for rowid in [from, to] {
        let exists: i64 = tx.query_row(
            &format!("SELECT count(*) FROM {quoted} WHERE rowid = ?1"),
            params![rowid],
            |row| row.get(0),
        )?;
        if exists == 0 {
            log::warn!(
                "move_row on '{}': rowid {rowid} does not exist, dropping the reorder",
                table.name
            );
            return Ok(());
        }
    }

    let offset: i64 = tx.query_row(
        &format!("SELECT COALESCE(max(rowid), -1) + 1 FROM {quoted}"),
        [],
        |row| row.get(0),
    )?;
    let (lo, hi, shift) = if from < to { (from, to, -1) } else { (to, from, 1) };

    tx.execute(
        &format!(
            "UPDATE {quoted}
             SET rowid = (CASE WHEN rowid = ?1 THEN ?2 ELSE rowid + ?3 END) + ?4
             WHERE rowid BETWEEN ?5 AND ?6"
        ),
        params![from, to, shift, offset, lo, hi],
    )?;
    tx.execute(
        &format!("UPDATE {quoted} SET rowid = rowid - ?1 WHERE rowid >= ?1"),
        params![offset],
    )?;
    tx.execute(
        "UPDATE gridlite_table SET order_by = NULL WHERE table_name = ?1",
        params![table.name],
    )?;
    tx.commit()?;
    Ok(())
}

/// Reassign physical rowids to match the order implied by the table's
/// `order_by`, evaluated against the raw view. All rowids are negated first
/// to clear the positive range, then ascending ids are handed out following
/// the computed order.
///
/// Calling this without `order_by` set is a programming error.
pub(crate) fn sort_rowids(conn: &mut Connection, table: &Table) -> Result<()> {
    let order_by = table
        .order_by
        .as_deref()
        .expect("sort_rowids requires the table to have an order_by");

    let tx = conn.transaction()?;
    let ordered: Vec<i64> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT rowid FROM {} ORDER BY {order_by}",
            quote_ident(&raw_view_name(&table.name))
        ))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let quoted = quote_ident(&table.name);
    // Shift by one while negating so rowid 0 leaves the positive range too.
    tx.execute(&format!("UPDATE {quoted} SET rowid = -(rowid + 1)"), [])?;
    for (index, rowid) in ordered.iter().enumerate() {
        let affected = tx.execute(
            &format!("UPDATE {quoted} SET rowid = ?1 WHERE rowid = ?2"),
            params![index as i64 + 1, -(rowid + 1)],
        )?;
        expect_one(affected, "sort_rowids reassign")?;
    }
    tx.commit()?;
    Ok(())
}

/// Replace the SQL source of a `view`/`pivot` table. Invalid SQL rolls the
/// whole operation back, leaving the previous view intact. Registry rows for
/// physical columns that disappeared are pruned, positions are closed up, and
/// new physical columns are registered at the end.
pub(crate) fn set_source(conn: &mut Connection, table: &Table, source: &str) -> Result<()> {
    let tx = conn.transaction()?;
    let quoted = quote_ident(&table.name);
    tx.execute_batch(&format!(
        "DROP VIEW IF EXISTS {quoted};\nCREATE VIEW {quoted} AS {source};"
    ))?;
    tx.execute(
        "DELETE FROM gridlite_column
         WHERE table_name = ?1 AND formula IS NULL
           AND name NOT IN (SELECT name FROM pragma_table_info(?1))",
        params![table.name],
    )?;
    renumber_positions(&tx, &table.name)?;
    catalog::register_table(&tx, &table.name, table.kind)?;
    tx.commit()?;
    Ok(())
}

/// Rebuild a physical table under the same name: rename to a temp, create the
/// new shape, copy rows (keeping rowids), drop the temp. Used for column
/// drop and rename, which the engine does not support natively.
fn rebuild_table(
    tx: &Transaction<'_>,
    name: &str,
    new_columns: &[&str],
    copy_from: &[&str],
) -> Result<()> {
    let quoted = quote_ident(name);
    tx.execute_batch(&format!(
        "ALTER TABLE {quoted} RENAME TO {tmp};
         CREATE TABLE {quoted} ({new});
         INSERT INTO {quoted} (rowid, {new}) SELECT rowid, {old} FROM {tmp};
         DROP TABLE {tmp};",
        tmp = REBUILD_TMP,
        new = quote_idents(new_columns.iter().copied()),
        old = quote_idents(copy_from.iter().copied()),
    ))?;
    Ok(())
}

/// Close gaps in a table's position range, restoring the `0..n-1`
/// permutation. Two-phase like every other ordinal rewrite.
pub(crate) fn renumber_positions(conn: &Connection, table_name: &str) -> Result<()> {
    let offset: i64 = conn.query_row(
        "SELECT COALESCE(max(position), -1) + 1 FROM gridlite_column WHERE table_name = ?1",
        params![table_name],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE gridlite_column SET position = position + ?2 WHERE table_name = ?1",
        params![table_name, offset],
    )?;

    let names: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM gridlite_column WHERE table_name = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![table_name], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    for (index, name) in names.iter().enumerate() {
        conn.execute(
            "UPDATE gridlite_column SET position = ?3 WHERE table_name = ?1 AND name = ?2",
            params![table_name, name, index as i64],
        )?;
    }
    Ok(())
}

pub(crate) fn drop_generated_views(conn: &Connection, table_name: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP VIEW IF EXISTS {};\nDROP VIEW IF EXISTS {};",
        quote_ident(&raw_view_name(table_name)),
        quote_ident(&formatted_view_name(table_name)),
    ))?;
    Ok(())
}

/// Extract the SELECT body of an existing view from `sqlite_master`.
fn view_body(conn: &Connection, name: &str) -> Result<String> {
    let sql: String = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'view' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    // "CREATE VIEW <name> AS <body>". A quoted name may itself contain
    // " as " (pre-existing user views), so skip past the identifier before
    // searching for the keyword.
    let start = end_of_view_name(&sql);
    match sql[start..].to_uppercase().find(" AS ") {
        Some(at) => Ok(sql[start + at + 4..].to_string()),
        None => Err(StorageError::ViewSource(name.to_string())),
    }
}

/// Offset just past the view name in a `CREATE VIEW` statement. Unquoted
/// names contain no spaces, so 0 is safe for them; quoted names are scanned
/// to their closing quote (doubled quotes escape).
fn end_of_view_name(sql: &str) -> usize {
    let open = match sql.find('"') {
        // A quote after the first " AS " is already inside the body.
        Some(open) if !sql[..open].to_uppercase().contains(" AS ") => open,
        _ => return 0,
    };
    let bytes = sql.as_bytes();
    let mut at = open + 1;
    while at < bytes.len() {
        if bytes[at] == b'"' {
            if bytes.get(at + 1) == Some(&b'"') {
                at += 2;
            } else {
                return at + 1;
            }
        } else {
            at += 1;
        }
    }
    bytes.len()
}
