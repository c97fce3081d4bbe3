//! # duke-merge-xlsx
//!
//! Values-only XLSX (Office Open XML) reader and writer for duke-merge.
//!
//! Only what a mail merge needs is read: sheet names, the active sheet, the
//! date system, cell values and the cached results of formulas. Number
//! formats are consulted just far enough to tell dates and times apart from
//! plain numbers.

pub mod error;
pub mod reader;
pub mod writer;

mod styles;

pub use error::{XlsxError, XlsxResult};
pub use reader::XlsxReader;
pub use writer::XlsxWriter;
