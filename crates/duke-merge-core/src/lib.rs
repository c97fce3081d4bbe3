//! # duke-merge-core
//!
//! Core spreadsheet data structures for the duke-merge mail-merge tool.
//!
//! - [`CellValue`] - Cell values (numbers, strings, booleans, dates, errors, cached formulas)
//! - [`CellAddress`] - A1-style addressing
//! - [`Workbook`], [`Worksheet`] - Values-only, read-mostly document structures
//!
//! ## Example
//!
//! ```rust
//! use duke_merge_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! sheet.set_cell_value("B5", "Alice").unwrap();
//! sheet.set_cell_value_at(4, 2, CellValue::Number(42.0)).unwrap();
//!
//! assert_eq!(sheet.max_row(), 5);
//! ```

pub mod cell;
pub mod datetime;
pub mod error;
pub mod number_format;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{CellAddress, CellError, CellValue, SharedString};
pub use error::{Error, Result};
pub use number_format::{FormatKind, NumberFormat};
pub use workbook::{Workbook, WorkbookSettings};
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
