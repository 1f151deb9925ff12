//! # sheetshift-core
//!
//! Core data structures shared by the sheetshift formula translator:
//! - [`CellAddress`] and [`CellRange`] - A1 addressing with `$` markers
//! - [`TableGeometry`] and [`TableSet`] - table layouts for structured references
//!
//! ## Example
//!
//! ```rust
//! use sheetshift_core::{CellAddress, TableGeometry, TableSet};
//!
//! let table = TableGeometry::from_header(
//!     "Sales",
//!     "Sheet1",
//!     CellAddress::parse("B2").unwrap(),
//!     8,
//!     ["Amount", "Date"],
//! );
//! let tables = TableSet::new([table]).unwrap();
//! assert!(tables.get("sales").is_some());
//! ```

pub mod cell;
pub mod error;
pub mod table;

pub use cell::{qualify_with_sheet, sheet_name_needs_quotes, CellAddress, CellRange};
pub use error::{Error, Result, TableError};
pub use table::{TableGeometry, TableSet};

/// Maximum number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet
pub const MAX_COLS: u16 = 16_384;
