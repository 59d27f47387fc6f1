//! Column-reference extraction for Gridlite formula expressions.
//!
//! A formula is an opaque SQL scalar expression evaluated by SQLite; the only
//! thing the engine needs to know about it is *which columns it reads*, so
//! that formula columns can be compiled in dependency order. This crate
//! parses the fragment as a synthetic `SELECT <expr>` statement and collects
//! every identifier the parser classifies as a column reference.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{visit_expressions, Expr};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

/// The formula fragment is not a valid SQL scalar expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse formula '{expression}': {message}")]
pub struct ParseError {
    pub expression: String,
    pub message: String,
}

/// Return the set of column names referenced by a SQL scalar expression.
///
/// Table-qualified references (`other.x`) are returned as the dotted text;
/// they can never match a bare column name, so the view compiler reports
/// them as unresolved dependencies. String literals, function names and
/// keywords are not identifiers and are never returned.
pub fn column_references(expression: &str) -> Result<BTreeSet<String>, ParseError> {
    let sql = format!("SELECT {expression}");
    let statements = Parser::parse_sql(&SQLiteDialect {}, &sql).map_err(|err| ParseError {
        expression: expression.to_string(),
        message: err.to_string(),
    })?;

    let mut columns = BTreeSet::new();
    let _ = visit_expressions(&statements, |expr: &Expr| {
        match expr {
            Expr::Identifier(ident) => {
                columns.insert(ident.value.clone());
            }
            Expr::CompoundIdentifier(parts) => {
                columns.insert(
                    parts
                        .iter()
                        .map(|part| part.value.as_str())
                        .collect::<Vec<_>>()
                        .join("."),
                );
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(expression: &str) -> Vec<String> {
        column_references(expression)
            .expect("parse expression")
            .into_iter()
            .collect()
    }

    #[test]
    fn arithmetic_over_one_column() {
        assert_eq!(refs("a + 1"), ["a"]);
    }

    #[test]
    fn function_arguments_are_collected_but_not_function_names() {
        assert_eq!(refs("round(price * quantity, 2)"), ["price", "quantity"]);
    }

    #[test]
    fn string_literals_are_not_columns() {
        assert_eq!(refs("name || '!'"), ["name"]);
        assert!(refs("'constant'").is_empty());
    }

    #[test]
    fn case_expression() {
        assert_eq!(
            refs("CASE WHEN amount > 0 THEN amount ELSE fallback END"),
            ["amount", "fallback"]
        );
    }

    #[test]
    fn qualified_references_keep_their_qualifier() {
        assert_eq!(refs("other.x + 1"), ["other.x"]);
    }

    #[test]
    fn identifier_case_is_preserved() {
        assert_eq!(refs("Price * 2"), ["Price"]);
    }

    #[test]
    fn malformed_expression_is_a_parse_error() {
        let err = column_references("1 +").expect_err("should not parse");
        assert_eq!(err.expression, "1 +");
    }
}
