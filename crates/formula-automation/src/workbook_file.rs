//! JSON workbook files understood by [`crate::InMemoryHost`].
//!
//! The layout follows the oracle workbook payloads used elsewhere in the workspace: sheets in tab
//! order, each with an A1-keyed map of cells carrying a literal value and an optional formula.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::host::HostError;

pub const WORKBOOK_FILE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookFile {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub sheets: Vec<SheetFile>,
    /// Recorded macros stored with the workbook.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub macros: Vec<MacroDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetFile {
    pub name: String,
    #[serde(default)]
    pub cells: BTreeMap<String, CellFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

/// A named macro made of simple worksheet actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroDef {
    /// Procedure name as callers spell it (`Module1.Chart2_Click`). Matched case-insensitively.
    pub name: String,
    #[serde(default)]
    pub actions: Vec<MacroAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MacroAction {
    /// `Sheets(sheet).Range(cell).Value = value`
    SetValue {
        sheet: String,
        cell: String,
        value: serde_json::Value,
    },
    /// `Sheets(sheet).Range(to).Value = Sheets(sheet).Range(from).Value`
    CopyValue {
        sheet: String,
        from: String,
        to: String,
    },
    /// Raise a runtime error.
    Fail { message: String },
}

impl WorkbookFile {
    pub fn from_json_slice(bytes: &[u8], path: &Path) -> Result<Self, HostError> {
        serde_json::from_slice(bytes).map_err(|source| HostError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, HostError> {
        let bytes = fs::read(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_slice(&bytes, path)
    }

    /// Write the workbook as pretty JSON, replacing `path` atomically.
    ///
    /// The destination directory must already exist.
    pub fn write(&self, path: &Path) -> Result<(), HostError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| HostError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &bytes).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetFile> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

impl SheetFile {
    pub fn value(&self, a1: &str) -> Option<&serde_json::Value> {
        self.cells.get(a1).and_then(|c| c.value.as_ref())
    }
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // `Path::parent` is `Some("")` for bare file names.
    let dir: PathBuf = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|err| err.error)?;
    Ok(())
}
