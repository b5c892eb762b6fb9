//! On-disk notebook documents.
//!
//! Only the parts the orchestrator needs are modelled: the kernel-naming
//! metadata and each cell's type and source. Everything else in the file is
//! ignored.

use std::borrow::Cow;
use std::path::Path;

use serde::Deserialize;

use crate::{AppError, Result};

/// Cell type tag for executable cells.
pub const CODE_CELL: &str = "code";

/// A metadata section that may carry a `name` field.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NamedSection {
    /// Declared name, if present.
    #[serde(default)]
    pub name: Option<String>,
}

impl NamedSection {
    fn non_empty_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Notebook-level metadata used for kernel selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NotebookMetadata {
    /// Kernel info recorded by a previous run.
    #[serde(default)]
    pub kernel_info: Option<NamedSection>,
    /// Kernel specification the notebook was authored against.
    #[serde(default)]
    pub kernelspec: Option<NamedSection>,
    /// Language the notebook was authored in.
    #[serde(default)]
    pub language_info: Option<NamedSection>,
}

impl NotebookMetadata {
    /// First non-empty name among `kernel_info`, `kernelspec` and
    /// `language_info`, in that order.
    #[must_use]
    pub fn declared_kernel_name(&self) -> Option<&str> {
        [&self.kernel_info, &self.kernelspec, &self.language_info]
            .into_iter()
            .flatten()
            .find_map(NamedSection::non_empty_name)
    }
}

/// Cell source: one string or a list of fragments.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CellSource {
    /// Whole source as a single string.
    Text(String),
    /// Source split into fragments, joined without separators.
    Fragments(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl CellSource {
    /// Source text with fragments concatenated in order.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Fragments(parts) => Cow::Owned(parts.concat()),
        }
    }
}

/// A single notebook cell.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Cell {
    /// Cell type (`code`, `markdown`, `raw`, ...).
    pub cell_type: String,
    /// Cell source.
    #[serde(default)]
    pub source: CellSource,
}

impl Cell {
    /// Build a code cell, mostly for programmatic documents.
    #[must_use]
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            cell_type: CODE_CELL.to_owned(),
            source: CellSource::Text(source.into()),
        }
    }

    /// Whether the cell is submitted for execution.
    #[must_use]
    pub fn is_code(&self) -> bool {
        self.cell_type == CODE_CELL
    }
}

/// A notebook document, read once and never mutated.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Notebook {
    /// Notebook metadata.
    #[serde(default)]
    pub metadata: NotebookMetadata,
    /// Cells in document order.
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// Read and parse a notebook file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Document` if the file cannot be read or is not a
    /// notebook.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Document(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse a notebook from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Document` if the text is not a notebook.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| AppError::Document(format!("invalid notebook: {err}")))
    }

    /// Build a metadata-less notebook from code snippets.
    #[must_use]
    pub fn from_code<I, S>(snippets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata: NotebookMetadata::default(),
            cells: snippets.into_iter().map(Cell::code).collect(),
        }
    }

    /// Code cells with their document index.
    pub fn code_cells(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells.iter().enumerate().filter(|(_, cell)| cell.is_code())
    }
}
