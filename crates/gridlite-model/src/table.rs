use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::error::ModelError;

/// What kind of relation backs a table: a physical table, a SQL view, or a
/// pivot (a generated view whose SQL source is managed like a view's).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
    Pivot,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
            TableKind::Pivot => "pivot",
        }
    }

    pub fn parse(text: &str) -> Result<Self, ModelError> {
        match text {
            "table" => Ok(TableKind::Table),
            "view" => Ok(TableKind::View),
            "pivot" => Ok(TableKind::Pivot),
            other => Err(ModelError::UnknownTableKind(other.to_string())),
        }
    }

    /// Physical tables carry a real rowid; view-backed sources have no
    /// natural row identity.
    pub fn has_rowid(self) -> bool {
        matches!(self, TableKind::Table)
    }
}

/// One registered table of a document, with its columns in position order.
///
/// Instances are snapshots: the storage layer rebuilds the whole list from
/// the catalog whenever the document updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    /// SQL `ORDER BY` clause for manual row ordering, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Table {
            name: name.into(),
            kind,
            order_by: None,
            description: None,
            columns: Vec::new(),
        }
    }

    /// True iff any column defines a summary, i.e. the formatted view gets an
    /// aggregate footer row.
    pub fn has_footer(&self) -> bool {
        self.columns.iter().any(|c| c.summary.is_some())
    }

    /// Look a column up by name. SQL identifiers compare case-insensitively.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_at(&self, position: i64) -> Option<&Column> {
        self.columns.iter().find(|c| c.position == position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Summary;
    use pretty_assertions::assert_eq;

    fn table_with_columns(names: &[&str]) -> Table {
        let mut table = Table::new("example", TableKind::Table);
        table.columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| Column::new(*name, i as i64))
            .collect();
        table
    }

    #[test]
    fn kind_parse_round_trips() {
        for kind in [TableKind::Table, TableKind::View, TableKind::Pivot] {
            assert_eq!(TableKind::parse(kind.as_str()), Ok(kind));
        }
        assert_eq!(
            TableKind::parse("matview"),
            Err(ModelError::UnknownTableKind("matview".to_string()))
        );
    }

    #[test]
    fn footer_requires_a_summary() {
        let mut table = table_with_columns(&["name", "amount"]);
        assert!(!table.has_footer());

        table.columns[1].summary = Some(Summary::Sum);
        assert!(table.has_footer());
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let table = table_with_columns(&["Amount"]);
        assert!(table.column("amount").is_some());
        assert!(table.column("AMOUNT").is_some());
        assert!(table.column("total").is_none());
        assert_eq!(table.column_at(0).map(|c| c.name.as_str()), Some("Amount"));
    }
}
