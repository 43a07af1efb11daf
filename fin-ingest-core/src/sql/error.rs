//! Structured error types for the SQL layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    /// Invalid merge mode, mode/returning combination, or column layout.
    /// Always raised before any statement is sent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The row width does not match the staging column list.
    #[error("row {index} has {actual} values, expected {expected}")]
    RowArity {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// A returning merge produced no row for the attempted key.
    #[error("merge into '{table}' returned no row")]
    MissingReturnedRow { table: String },

    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
}

impl SqlError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SqlError::Config(msg.into())
    }

    /// True for errors raised before any statement was sent.
    pub fn is_config(&self) -> bool {
        matches!(self, SqlError::Config(_) | SqlError::RowArity { .. })
    }
}
