use thiserror::Error;

/// Errors raised when catalog text does not map onto the closed model enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown column format: {0}")]
    UnknownFormat(String),
    #[error("unknown summary: {0}")]
    UnknownSummary(String),
    #[error("unknown table type: {0}")]
    UnknownTableKind(String),
}
