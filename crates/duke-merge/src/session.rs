//! Interactive session state for a shell

use std::path::Path;

use duke_merge_core::{Workbook, Worksheet};
use duke_merge_docx::DocxDocument;
use tracing::{info, warn};

use crate::error::MergeResult;
use crate::mapping::{Configuration, MappingStore};
use crate::render::stringify;
use crate::resolver::resolve;
use crate::{load_template, WorkbookExt};

/// The mapping store plus whatever inputs are currently open
///
/// A shell keeps one of these and hands [`configuration`](Self::configuration)
/// to the batch driver.
#[derive(Debug, Default)]
pub struct Session {
    store: MappingStore,
    workbook: Option<Workbook>,
    template: Option<DocxDocument>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a spreadsheet and remember its path
    ///
    /// On failure the previous spreadsheet and path are kept.
    pub fn select_spreadsheet<P: AsRef<Path>>(&mut self, path: P) -> MergeResult<()> {
        let path = path.as_ref();
        let workbook = Workbook::open(path)?;
        info!(path = %path.display(), "spreadsheet selected");
        self.workbook = Some(workbook);
        self.store.set_excel_path(path.to_string_lossy());
        Ok(())
    }

    /// Open a template and remember its path
    pub fn select_template<P: AsRef<Path>>(&mut self, path: P) -> MergeResult<()> {
        let path = path.as_ref();
        let template = load_template(path)?;
        info!(path = %path.display(), "template selected");
        self.template = Some(template);
        self.store.set_word_template_path(path.to_string_lossy());
        Ok(())
    }

    /// Replace the mapping store from a configuration file
    ///
    /// The spreadsheet it names is opened if possible; failing to open it is
    /// logged and otherwise ignored.
    pub fn load_config<P: AsRef<Path>>(&mut self, path: P) -> MergeResult<()> {
        self.store.load(path)?;
        self.workbook = None;

        if let Some(excel) = self.store.configuration().spreadsheet() {
            match Workbook::open(excel) {
                Ok(workbook) => self.workbook = Some(workbook),
                Err(err) => {
                    warn!(path = %excel.display(), error = %err, "configured spreadsheet not opened")
                }
            }
        }
        Ok(())
    }

    /// Write the current configuration to a file
    pub fn save_config<P: AsRef<Path>>(&self, path: P) -> MergeResult<()> {
        self.store.save(path)
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MappingStore {
        &mut self.store
    }

    /// Active sheet of the open spreadsheet
    pub fn worksheet(&self) -> Option<&Worksheet> {
        self.workbook.as_ref().and_then(Workbook::active_worksheet)
    }

    pub fn template(&self) -> Option<&DocxDocument> {
        self.template.as_ref()
    }

    /// Current text at `cell_ref` on the open sheet
    ///
    /// `None` when nothing is open, the reference is malformed, or the cell
    /// is empty.
    pub fn preview(&self, cell_ref: &str) -> Option<String> {
        let value = resolve(self.worksheet(), &cell_ref.trim().to_ascii_uppercase())?;
        Some(stringify(Some(&value)))
    }

    /// Snapshot of the configuration for a batch run
    pub fn configuration(&self) -> Configuration {
        self.store.configuration().clone()
    }
}
