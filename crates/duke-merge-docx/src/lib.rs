//! # duke-merge-docx
//!
//! Reads a Word (`.docx`) template, exposes its paragraphs for rewriting and
//! writes the result back. Every package part other than the main document
//! is carried over byte for byte.
//!
//! ```no_run
//! use duke_merge_docx::DocxDocument;
//!
//! let mut doc = DocxDocument::open("template.docx")?;
//! for mut paragraph in doc.paragraphs_mut() {
//!     let text = paragraph.text().replace("${name}", "Ann");
//!     paragraph.set_text(&text);
//! }
//! doc.save("out.docx")?;
//! # Ok::<(), duke_merge_docx::DocxError>(())
//! ```

pub mod document;
pub mod error;
pub mod xml;

pub use document::{apply_replacements, DocxDocument, Paragraph};
pub use error::{DocxError, DocxResult};
