//! # duke-merge
//!
//! Spreadsheet-to-Word mail merge.
//!
//! Rows are read from the active sheet of an `.xlsx` workbook. Each data row
//! produces one `.docx` file, made by replacing `${token}` placeholders in a
//! template with the values of the mapped cells on that row.
//!
//! - [`resolver`] turns a cell reference into a value
//! - [`mapping`] holds the token mappings and the YAML configuration
//! - [`rows`] finds the data rows below the header block
//! - [`render`] fills one copy of the template
//! - [`batch`] drives a whole run with progress and cancellation
//! - [`session`] keeps the open inputs for an interactive shell
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use duke_merge::{generate, GenerateOptions, GenerationMode, MappingStore, NoProgress};
//!
//! let mut store = MappingStore::new();
//! store.set_excel_path("people.xlsx");
//! store.set_word_template_path("letter.docx");
//! store.add("name", "B4");
//! store.add("amount", "C4");
//!
//! let written = generate(
//!     store.configuration(),
//!     Path::new("out"),
//!     &GenerationMode::Separate,
//!     &GenerateOptions::default(),
//!     &mut NoProgress,
//! )?;
//! println!("{} documents", written);
//! # Ok::<(), duke_merge::MergeError>(())
//! ```

pub mod batch;
pub mod error;
pub mod mapping;
pub mod render;
pub mod resolver;
pub mod rows;
pub mod session;

pub use batch::{
    generate, required_inputs, CancellationFlag, GenerateOptions, GenerationMode, NoProgress,
    ProgressSink, DEFAULT_OUTPUT_PREFIX,
};
pub use error::{BatchAbortError, LikelyCause, MergeError, MergeResult};
pub use mapping::{normalize_token, Configuration, MappingEntry, MappingStore};
pub use render::{render, stringify};
pub use resolver::{parse_reference, relative_reference, resolve};
pub use rows::{enumerate_rows, RowPolicy, DEFAULT_HEADER_ROWS};
pub use session::Session;

pub use duke_merge_core::{CellAddress, CellValue, Workbook, Worksheet};
pub use duke_merge_docx::DocxDocument;

use std::path::Path;

use duke_merge_xlsx::XlsxReader;

/// Extension trait for Workbook to open spreadsheet files
pub trait WorkbookExt {
    /// Open a workbook, picking the reader from the file extension
    fn open<P: AsRef<Path>>(path: P) -> MergeResult<Workbook>;
}

impl WorkbookExt for Workbook {
    fn open<P: AsRef<Path>>(path: P) -> MergeResult<Workbook> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xlsm") => {
                XlsxReader::read_file(path).map_err(|e| MergeError::load(path, e))
            }
            _ => Err(MergeError::load(
                path,
                format!("unsupported spreadsheet format: {}", path.display()),
            )),
        }
    }
}

/// Open a `.docx` template
pub fn load_template<P: AsRef<Path>>(path: P) -> MergeResult<DocxDocument> {
    let path = path.as_ref();
    DocxDocument::open(path).map_err(|e| MergeError::load(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_unknown_extension() {
        let err = Workbook::open("people.ods").unwrap_err();
        assert!(matches!(err, MergeError::Load { .. }));
        assert_eq!(err.to_string(), "failed to load people.ods");
    }

    #[test]
    fn test_open_missing_template() {
        let err = load_template("/nonexistent/letter.docx").unwrap_err();
        assert!(matches!(err, MergeError::Load { .. }));
    }
}
