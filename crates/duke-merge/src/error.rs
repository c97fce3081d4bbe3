//! Merge error types

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for merge operations
pub type MergeResult<T> = std::result::Result<T, MergeError>;

/// Boxed underlying error
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while configuring or running a merge
#[derive(Debug, Error)]
pub enum MergeError {
    /// A spreadsheet or template could not be opened
    #[error("failed to load {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// A configuration file is malformed
    #[error("failed to parse configuration {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A cell reference is not letters followed by digits
    #[error("invalid cell reference '{0}'")]
    Reference(String),

    /// A file could not be read or written
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration lacks something a batch needs
    #[error("incomplete configuration: {0}")]
    Incomplete(String),

    /// A batch stopped on an unrecovered failure
    #[error(transparent)]
    BatchAbort(#[from] BatchAbortError),
}

impl MergeError {
    pub(crate) fn load<P, E>(path: P, source: E) -> Self
    where
        P: Into<PathBuf>,
        E: Into<BoxError>,
    {
        MergeError::Load {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A batch that stopped part-way
///
/// Files already written stay on disk.
#[derive(Debug, Error)]
#[error("document generation aborted while {stage}")]
pub struct BatchAbortError {
    /// What the batch was doing when it failed
    pub stage: String,
    /// Number of documents written before the failure
    pub generated: usize,
    /// The failure itself
    #[source]
    pub cause: Box<MergeError>,
}

impl BatchAbortError {
    pub(crate) fn new<S: Into<String>>(stage: S, generated: usize, cause: MergeError) -> Self {
        Self {
            stage: stage.into(),
            generated,
            cause: Box::new(cause),
        }
    }

    /// Things worth checking after a failed batch
    pub fn likely_causes(&self) -> &'static [LikelyCause] {
        &LikelyCause::ALL
    }

    /// Numbered checklist built from [`likely_causes`](Self::likely_causes)
    pub fn advisory(&self) -> String {
        let mut text = String::from("Please check:");
        for (i, cause) in self.likely_causes().iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, cause));
        }
        text
    }
}

/// Usual reasons a batch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikelyCause {
    InvalidCellReference,
    BadMapping,
    WrongTemplateTokens,
    EmptyCells,
}

impl LikelyCause {
    /// Every cause, in checklist order
    pub const ALL: [LikelyCause; 4] = [
        LikelyCause::InvalidCellReference,
        LikelyCause::BadMapping,
        LikelyCause::WrongTemplateTokens,
        LikelyCause::EmptyCells,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            LikelyCause::InvalidCellReference => "the spreadsheet cell references are correct",
            LikelyCause::BadMapping => "the token-to-cell mappings are configured correctly",
            LikelyCause::WrongTemplateTokens => "the token names in the Word template are correct",
            LikelyCause::EmptyCells => "the spreadsheet has no unexpected empty values",
        }
    }
}

impl fmt::Display for LikelyCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_batch_abort_keeps_cause() {
        let cause = MergeError::io(
            "out/document_3.docx",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let err = MergeError::from(BatchAbortError::new("saving row 6", 2, cause));

        assert_eq!(
            err.to_string(),
            "document generation aborted while saving row 6"
        );
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "I/O error on out/document_3.docx");
        assert_eq!(source.source().unwrap().to_string(), "denied");
    }

    #[test]
    fn test_advisory_lists_every_cause() {
        let err = BatchAbortError::new("loading", 0, MergeError::Incomplete("x".into()));
        let advisory = err.advisory();

        assert!(advisory.starts_with("Please check:"));
        for (i, cause) in LikelyCause::ALL.iter().enumerate() {
            assert!(advisory.contains(&format!("{}. {}", i + 1, cause)));
        }
        assert_eq!(err.likely_causes().len(), 4);
    }
}
