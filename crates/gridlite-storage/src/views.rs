//! View compilation: derive `<name>_raw` and `<name>_formatted` from catalog
//! state.
//!
//! The raw view resolves formula columns; the formatted view applies display
//! formatting and the optional aggregate footer row. Compilation is total and
//! idempotent: both views are dropped and recreated in full on every
//! `Document::update`.

use std::collections::HashSet;

use gridlite_model::{Column, ColumnFormat, Summary, Table, TableKind};
use rusqlite::Connection;

use crate::error::{Result, StorageError};
use crate::sql::{formatted_view_name, quote_ident, raw_view_name};

pub(crate) fn compile_views(conn: &Connection, table: &Table) -> Result<()> {
    let raw = raw_view_sql(table)?;
    let formatted = formatted_view_sql(table);
    log::debug!("compiling views for table '{}'", table.name);
    replace_view(conn, &raw_view_name(&table.name), &raw)?;
    replace_view(conn, &formatted_view_name(&table.name), &formatted)?;
    Ok(())
}

fn replace_view(conn: &Connection, name: &str, select: &str) -> Result<()> {
    let quoted = quote_ident(name);
    conn.execute_batch(&format!(
        "DROP VIEW IF EXISTS {quoted};\nCREATE VIEW {quoted} AS {select};"
    ))?;
    Ok(())
}

/// A formula column waiting for its dependencies to become available.
struct PendingColumn<'a> {
    column: &'a Column,
    formula: &'a str,
    /// Lowercased column names the formula reads.
    deps: HashSet<String>,
}

/// Build the raw view's SELECT.
///
/// SQL cannot forward-reference a computed alias within one SELECT, so
/// formula columns are resolved by iterative layering: each pass emits every
/// formula whose dependencies are already available and wraps the result as a
/// subquery for the next pass. Every pass must make progress; a pass that
/// resolves nothing means the remaining columns are cyclic or reference
/// something that does not exist, which caps the loop at the column count.
fn raw_view_sql(table: &Table) -> Result<String> {
    let mut available: HashSet<String> = table
        .columns
        .iter()
        .filter(|c| c.formula.is_none())
        .map(|c| c.name.to_lowercase())
        .collect();

    let mut pending = Vec::new();
    for column in &table.columns {
        if let Some(formula) = &column.formula {
            let deps = gridlite_expr::column_references(formula)?
                .into_iter()
                .map(|name| name.to_lowercase())
                .collect();
            pending.push(PendingColumn {
                column,
                formula,
                deps,
            });
        }
    }

    // Innermost layer: real columns straight from the source relation, plus a
    // row identity. View-backed sources have none, so they get a NULL one.
    let mut items: Vec<String> = vec![match table.kind {
        TableKind::Table => "rowid".to_string(),
        TableKind::View | TableKind::Pivot => "NULL AS rowid".to_string(),
    }];
    items.extend(
        table
            .columns
            .iter()
            .filter(|c| c.formula.is_none())
            .map(|c| quote_ident(&c.name)),
    );

    let (ready, mut pending) = split_ready(pending, &available);
    for entry in &ready {
        items.push(formula_item(entry));
        available.insert(entry.column.name.to_lowercase());
    }
    let mut query = format!(
        "SELECT {} FROM {}",
        items.join(", "),
        quote_ident(&table.name)
    );

    while !pending.is_empty() {
        let (ready, rest) = split_ready(pending, &available);
        if ready.is_empty() {
            return Err(StorageError::Dependency {
                table: table.name.clone(),
                columns: rest.iter().map(|e| e.column.name.clone()).collect(),
            });
        }
        pending = rest;

        let mut layer: Vec<String> = vec!["*".to_string()];
        for entry in &ready {
            layer.push(formula_item(entry));
            available.insert(entry.column.name.to_lowercase());
        }
        query = format!("SELECT {} FROM ({})", layer.join(", "), query);
    }

    // Outermost projection restores catalog position order regardless of how
    // the layers interleaved formula and plain columns.
    let mut outer: Vec<String> = vec!["rowid".to_string()];
    outer.extend(table.columns.iter().map(|c| quote_ident(&c.name)));
    let mut sql = format!("SELECT {} FROM ({})", outer.join(", "), query);

    if let Some(order_by) = &table.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    Ok(sql)
}

fn split_ready<'a>(
    pending: Vec<PendingColumn<'a>>,
    available: &HashSet<String>,
) -> (Vec<PendingColumn<'a>>, Vec<PendingColumn<'a>>) {
    pending
        .into_iter()
        .partition(|entry| entry.deps.iter().all(|dep| available.contains(dep)))
}

fn formula_item(entry: &PendingColumn<'_>) -> String {
    format!("({}) AS {}", entry.formula, quote_ident(&entry.column.name))
}

/// Build the formatted view's SELECT: every raw column through its format
/// function, plus the footer row when any column defines a summary.
fn formatted_view_sql(table: &Table) -> String {
    let raw = quote_ident(&raw_view_name(&table.name));

    let mut select: Vec<String> = vec!["rowid".to_string()];
    for column in &table.columns {
        select.push(format!(
            "{} AS {}",
            format_expr(column, &quote_ident(&column.name)),
            quote_ident(&column.name)
        ));
    }
    let mut sql = format!("SELECT {} FROM {}", select.join(", "), raw);

    if table.has_footer() {
        let mut footer: Vec<String> = vec!["NULL".to_string()];
        for column in &table.columns {
            let aggregated = match column.summary {
                Some(summary) => summary_expr(summary, &quote_ident(&column.name)),
                None => "NULL".to_string(),
            };
            footer.push(format!(
                "{} AS {}",
                format_expr(column, &aggregated),
                quote_ident(&column.name)
            ));
        }
        sql.push_str(&format!(
            " UNION ALL SELECT {} FROM {}",
            footer.join(", "),
            raw
        ));
    }
    sql
}

/// Wrap a value expression in the column's display format. All of these are
/// null-preserving: `round(NULL, n)` and `date(NULL)` both yield NULL.
fn format_expr(column: &Column, input: &str) -> String {
    match column.format {
        None | Some(ColumnFormat::Generic) => input.to_string(),
        Some(ColumnFormat::Number) | Some(ColumnFormat::Money) => {
            let precision = column.effective_precision().unwrap_or(0);
            format!("round({input}, {precision})")
        }
        Some(ColumnFormat::Date) => format!("date({input})"),
    }
}

fn summary_expr(summary: Summary, input: &str) -> String {
    match summary {
        Summary::Sum => format!("sum({input})"),
        Summary::Avg => format!("avg({input})"),
    }
}
