//! Batch document generation

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use duke_merge_core::Workbook;
use duke_merge_docx::DocxError;
use tracing::{debug, info, warn};

use crate::error::{BatchAbortError, MergeError, MergeResult};
use crate::mapping::Configuration;
use crate::render::render;
use crate::rows::{enumerate_rows, RowPolicy, DEFAULT_HEADER_ROWS};
use crate::{load_template, WorkbookExt};

/// Prefix of generated file names
pub const DEFAULT_OUTPUT_PREFIX: &str = "document_";

/// How generated documents are laid out on disk
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// One document per data row
    #[default]
    Separate,
    /// Every row in one document (reserved, generates nothing)
    Combined,
    /// Anything else
    Unsupported(String),
}

impl GenerationMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "separate" => GenerationMode::Separate,
            "combined" => GenerationMode::Combined,
            _ => GenerationMode::Unsupported(s.to_string()),
        }
    }
}

impl From<&str> for GenerationMode {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::Separate => f.write_str("separate"),
            GenerationMode::Combined => f.write_str("combined"),
            GenerationMode::Unsupported(s) => f.write_str(s),
        }
    }
}

/// Knobs for [`generate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Rows above the data
    pub header_rows: u32,
    /// Which rows count as data
    pub row_policy: RowPolicy,
    /// Output files are named `{output_prefix}{n}.docx`
    pub output_prefix: String,
    /// Replace inside runs instead of flattening rewritten paragraphs
    pub preserve_run_formatting: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            header_rows: DEFAULT_HEADER_ROWS,
            row_policy: RowPolicy::default(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            preserve_run_formatting: false,
        }
    }
}

impl GenerateOptions {
    /// Path of the `n`th output document (1-based)
    pub fn output_path(&self, save_dir: &Path, n: usize) -> PathBuf {
        save_dir.join(format!("{}{}.docx", self.output_prefix, n))
    }
}

/// Receives progress and answers cancellation polls
///
/// Polled once per row boundary; a row in progress always completes.
pub trait ProgressSink {
    /// Called with `(rows_done, rows_total)`
    fn report(&mut self, done: usize, total: usize);

    /// Whether the batch should stop before the next row
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Ignores progress, never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _done: usize, _total: usize) {}
}

/// Shared cancellation signal
///
/// Clones share the flag, so one can be handed to whatever requests the stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batch to stop at the next row boundary
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl ProgressSink for CancellationFlag {
    fn report(&mut self, _done: usize, _total: usize) {}

    fn is_cancelled(&self) -> bool {
        CancellationFlag::is_cancelled(self)
    }
}

/// The spreadsheet and template paths of a configuration ready to run
///
/// Fails with [`MergeError::Incomplete`] when either path or every mapping
/// is missing.
pub fn required_inputs(config: &Configuration) -> MergeResult<(&Path, &Path)> {
    let spreadsheet = config
        .spreadsheet()
        .ok_or_else(|| MergeError::Incomplete("no spreadsheet selected".into()))?;
    let template = config
        .template()
        .ok_or_else(|| MergeError::Incomplete("no template selected".into()))?;
    if config.mappings.is_empty() {
        return Err(MergeError::Incomplete("no mappings configured".into()));
    }
    Ok((spreadsheet, template))
}

/// Generate one document per data row into `save_dir`
///
/// The spreadsheet and template are loaded fresh from the paths in
/// `config`; each row is rendered from a pristine copy of the template.
/// Returns the number of documents written, which is short of the row count
/// only when the sink cancelled. Modes other than
/// [`GenerationMode::Separate`] write nothing and return 0.
///
/// # Errors
///
/// [`MergeError::Incomplete`] before anything is loaded when a path or the
/// mappings are missing. Any later failure is a [`MergeError::BatchAbort`];
/// documents already written are left in place.
pub fn generate(
    config: &Configuration,
    save_dir: &Path,
    mode: &GenerationMode,
    options: &GenerateOptions,
    sink: &mut dyn ProgressSink,
) -> MergeResult<usize> {
    let (spreadsheet, template_path) = required_inputs(config)?;

    if *mode != GenerationMode::Separate {
        warn!(%mode, "generation mode not supported, nothing generated");
        return Ok(0);
    }

    let workbook = Workbook::open(spreadsheet)
        .map_err(|e| BatchAbortError::new("loading the spreadsheet", 0, e))?;
    let template = load_template(template_path)
        .map_err(|e| BatchAbortError::new("loading the template", 0, e))?;

    let sheet = workbook.active_worksheet();
    let rows = sheet
        .map(|s| enumerate_rows(s, options.header_rows, options.row_policy))
        .unwrap_or_default();
    let mappings = config.token_map();
    let total = rows.len();

    info!(
        rows = total,
        out = %save_dir.display(),
        "generating documents"
    );
    sink.report(0, total);

    let mut generated = 0;
    for (idx, &row) in rows.iter().enumerate() {
        if sink.is_cancelled() {
            info!(generated, "generation cancelled");
            return Ok(generated);
        }

        let document = render(
            &template,
            row,
            &mappings,
            sheet,
            options.preserve_run_formatting,
        );
        let path = options.output_path(save_dir, idx + 1);
        document.save(&path).map_err(|e| {
            BatchAbortError::new(
                format!("saving row {}", row),
                generated,
                save_error(&path, e),
            )
        })?;

        generated += 1;
        debug!(row, path = %path.display(), "document written");
        sink.report(generated, total);
    }

    info!(generated, "generation finished");
    Ok(generated)
}

fn save_error(path: &Path, err: DocxError) -> MergeError {
    match err {
        DocxError::Io(e) => MergeError::io(path, e),
        other => MergeError::io(path, io::Error::new(io::ErrorKind::Other, other)),
    }
}
