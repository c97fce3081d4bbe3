//! Token mappings and the configuration file

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{MergeError, MergeResult};

/// Wrap `raw` in `${` and `}` unless it already has them
///
/// Character content is not validated.
pub fn normalize_token(raw: &str) -> String {
    let mut token = String::with_capacity(raw.len() + 3);
    if !raw.starts_with("${") {
        token.push_str("${");
    }
    token.push_str(raw);
    if !token.ends_with('}') {
        token.push('}');
    }
    token
}

/// One token-to-cell mapping, stored as entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Placeholder text in the template, e.g. `name` or `${name}`
    #[serde(rename = "word_variable")]
    pub token: String,
    /// Spreadsheet coordinate, e.g. `B4`; only its column is used per row
    #[serde(rename = "cell_ref")]
    pub cell_reference: String,
}

impl MappingEntry {
    pub fn new<T: Into<String>, C: Into<String>>(token: T, cell_reference: C) -> Self {
        Self {
            token: token.into(),
            cell_reference: cell_reference.into(),
        }
    }

    /// Token in `${name}` form
    pub fn normalized_token(&self) -> String {
        normalize_token(&self.token)
    }

    /// Cell reference in uppercase
    pub fn normalized_reference(&self) -> String {
        self.cell_reference.to_uppercase()
    }
}

/// Everything a batch needs: input paths and the ordered mappings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub excel_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub word_template_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mappings: Vec<MappingEntry>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Configuration {
    /// Spreadsheet path, if one is set
    pub fn spreadsheet(&self) -> Option<&Path> {
        non_empty_path(&self.excel_path)
    }

    /// Template path, if one is set
    pub fn template(&self) -> Option<&Path> {
        non_empty_path(&self.word_template_path)
    }

    /// Lookup from normalized token to uppercase cell reference
    ///
    /// Keeps first-insertion order; a later entry with the same token
    /// overwrites the earlier reference in place.
    pub fn token_map(&self) -> IndexMap<String, String> {
        let mut map = IndexMap::with_capacity(self.mappings.len());
        for entry in &self.mappings {
            map.insert(entry.normalized_token(), entry.normalized_reference());
        }
        map
    }

    /// Parse a configuration from YAML text
    ///
    /// Empty text gives the default configuration.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str::<Option<Self>>(text)?.unwrap_or_default())
    }

    /// Render as YAML text
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn non_empty_path(s: &str) -> Option<&Path> {
    if s.trim().is_empty() {
        None
    } else {
        Some(Path::new(s))
    }
}

/// The editable set of mappings plus the input paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    config: Configuration,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configuration(config: Configuration) -> Self {
        Self { config }
    }

    /// Read a store from a configuration file
    pub fn open<P: AsRef<Path>>(path: P) -> MergeResult<Self> {
        let mut store = Self::new();
        store.load(path)?;
        Ok(store)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn into_configuration(self) -> Configuration {
        self.config
    }

    pub fn set_excel_path<S: Into<String>>(&mut self, path: S) {
        self.config.excel_path = path.into();
    }

    pub fn set_word_template_path<S: Into<String>>(&mut self, path: S) {
        self.config.word_template_path = path.into();
    }

    /// Add a mapping, normalizing token and reference
    ///
    /// An existing mapping for the same token is updated in place.
    pub fn add(&mut self, token: &str, cell_reference: &str) {
        let entry = MappingEntry::new(normalize_token(token), cell_reference.to_uppercase());
        match self
            .config
            .mappings
            .iter_mut()
            .find(|e| e.normalized_token() == entry.token)
        {
            Some(existing) => *existing = entry,
            None => self.config.mappings.push(entry),
        }
    }

    /// Remove every mapping for `token`; returns whether any was removed
    pub fn remove(&mut self, token: &str) -> bool {
        let token = normalize_token(token);
        let before = self.config.mappings.len();
        self.config
            .mappings
            .retain(|e| e.normalized_token() != token);
        self.config.mappings.len() != before
    }

    /// Mappings in insertion order
    pub fn list(&self) -> &[MappingEntry] {
        &self.config.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.config.mappings.is_empty()
    }

    /// Write the configuration as YAML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MergeResult<()> {
        let path = path.as_ref();
        let text = self.config.to_yaml().map_err(|e| MergeError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, text).map_err(|e| MergeError::io(path, e))?;
        tracing::debug!(path = %path.display(), mappings = self.config.mappings.len(), "configuration saved");
        Ok(())
    }

    /// Replace the current state with a configuration file
    ///
    /// On error the current state is left unchanged.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> MergeResult<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| MergeError::io(path, e))?;
        self.config = Configuration::from_yaml(&text).map_err(|e| MergeError::Parse {
            path: PathBuf::from(path),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), mappings = self.config.mappings.len(), "configuration loaded");
        Ok(())
    }
}
