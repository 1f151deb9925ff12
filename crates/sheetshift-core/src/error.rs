//! Error types for sheetshift-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing addresses or validating table geometry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range format
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Row index out of bounds
    #[error("Row index {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column index out of bounds
    #[error("Column index {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u32, u16),

    /// Table geometry that cannot be used for reference resolution
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Precondition violations in [`TableGeometry`](crate::TableGeometry) records.
///
/// These are raised when a [`TableSet`](crate::TableSet) is built, so reference
/// resolution can assume well-formed tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table name must not be empty")]
    EmptyName,

    #[error("table '{0}' has no columns")]
    NoColumns(String),

    #[error("table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{0}' is declared more than once")]
    DuplicateTable(String),

    #[error("table '{table}' has invalid row bounds: header {header_row}, data {first_data_row}..={last_data_row}")]
    InvalidRows {
        table: String,
        header_row: u32,
        first_data_row: u32,
        last_data_row: u32,
    },

    #[error("table '{0}' extends past the last worksheet column")]
    TooWide(String),
}
