use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Horizontal alignment hint derived from a column's format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Right,
}

/// Display format of a column. This is a closed set: the catalog persists the
/// lowercase name and anything else fails to load with
/// [`ModelError::UnknownFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFormat {
    Generic,
    Number,
    Money,
    Date,
}

impl ColumnFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnFormat::Generic => "generic",
            ColumnFormat::Number => "number",
            ColumnFormat::Money => "money",
            ColumnFormat::Date => "date",
        }
    }

    pub fn parse(text: &str) -> Result<Self, ModelError> {
        match text {
            "generic" => Ok(ColumnFormat::Generic),
            "number" => Ok(ColumnFormat::Number),
            "money" => Ok(ColumnFormat::Money),
            "date" => Ok(ColumnFormat::Date),
            other => Err(ModelError::UnknownFormat(other.to_string())),
        }
    }

    /// Numeric formats align right, everything else left.
    pub fn alignment(self) -> Alignment {
        match self {
            ColumnFormat::Generic => Alignment::Left,
            ColumnFormat::Number | ColumnFormat::Money | ColumnFormat::Date => Alignment::Right,
        }
    }

    /// Digits after the decimal point when the column does not override it.
    pub fn default_precision(self) -> Option<u32> {
        match self {
            ColumnFormat::Number => Some(0),
            ColumnFormat::Money => Some(2),
            ColumnFormat::Generic | ColumnFormat::Date => None,
        }
    }
}

/// Footer aggregation of a column. Closed set, persisted by lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Summary {
    Sum,
    Avg,
}

impl Summary {
    pub fn as_str(self) -> &'static str {
        match self {
            Summary::Sum => "sum",
            Summary::Avg => "avg",
        }
    }

    pub fn parse(text: &str) -> Result<Self, ModelError> {
        match text {
            "sum" => Ok(Summary::Sum),
            "avg" => Ok(Summary::Avg),
            other => Err(ModelError::UnknownSummary(other.to_string())),
        }
    }
}

/// One column of a [`crate::Table`].
///
/// `position` is the ordinal rank inside the owning table; the storage layer
/// keeps positions a contiguous `0..n-1` permutation at every observable
/// state. A column with a `formula` exists only in the catalog; a column
/// without one is backed by a same-named field of the physical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ColumnFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// UI hint, opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

impl Column {
    pub fn new(name: impl Into<String>, position: i64) -> Self {
        Column {
            name: name.into(),
            position,
            format: None,
            summary: None,
            formula: None,
            description: None,
            width: None,
            precision: None,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Explicit precision if set, otherwise the format's default.
    pub fn effective_precision(&self) -> Option<u32> {
        self.precision
            .or_else(|| self.format.and_then(ColumnFormat::default_precision))
    }
}
