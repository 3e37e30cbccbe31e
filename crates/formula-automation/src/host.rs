use core::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::address::{A1ParseError, CellRef, ColumnRef};
use crate::sheet_name::SheetNameError;
use crate::value::CellValue;

/// Opaque handle to a document open in an automation host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Application-level switches applied when a batch session starts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostOptions {
    /// Whether the host's window is shown.
    pub visible: bool,
    /// Whether the host may raise modal alerts (save prompts, delete confirmations, macro errors).
    pub display_alerts: bool,
}

impl HostOptions {
    /// Invisible host with every interactive prompt suppressed.
    pub const fn unattended() -> Self {
        Self {
            visible: false,
            display_alerts: false,
        }
    }
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            visible: true,
            display_alerts: true,
        }
    }
}

/// Host operations, used to label recorded calls and injected faults.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOp {
    Configure,
    OpenDocument,
    CreateDocument,
    SheetNames,
    DeleteSheet,
    RenameSheet,
    CopySheet,
    CellValue,
    SetCellValue,
    LastUsedRow,
    Calculate,
    RefreshAll,
    RunMacro,
    SaveAs,
    CloseDocument,
    Quit,
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostOp::Configure => "configure",
            HostOp::OpenDocument => "open document",
            HostOp::CreateDocument => "create document",
            HostOp::SheetNames => "list sheets",
            HostOp::DeleteSheet => "delete sheet",
            HostOp::RenameSheet => "rename sheet",
            HostOp::CopySheet => "copy sheet",
            HostOp::CellValue => "read cell",
            HostOp::SetCellValue => "write cell",
            HostOp::LastUsedRow => "find last used row",
            HostOp::Calculate => "calculate",
            HostOp::RefreshAll => "refresh all",
            HostOp::RunMacro => "run macro",
            HostOp::SaveAs => "save as",
            HostOp::CloseDocument => "close document",
            HostOp::Quit => "quit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("automation host is not running")]
    NotRunning,
    #[error("host did not start: {0}")]
    Launch(String),
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
    #[error("sheet `{sheet}` not found in `{document}`")]
    UnknownSheet { document: String, sheet: String },
    #[error("invalid cell reference `{text}`: {source}")]
    InvalidCell {
        text: String,
        #[source]
        source: A1ParseError,
    },
    #[error("a sheet named `{0}` already exists")]
    DuplicateSheetName(String),
    #[error("invalid sheet name `{name}`: {source}")]
    InvalidSheetName {
        name: String,
        #[source]
        source: SheetNameError,
    },
    #[error("cannot delete `{0}`: a document must contain at least one sheet")]
    LastSheet(String),
    #[error("macro `{0}` not found")]
    MacroNotFound(String),
    #[error("macro `{name}` failed: {message}")]
    MacroFailed { name: String, message: String },
    #[error("document `{0}` has never been saved")]
    NoSavePath(String),
    #[error("i/o error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workbook file `{path}`: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{op} failed: {message}")]
    Injected { op: HostOp, message: String },
}

/// The object model a batch run drives: an application that owns documents, which own sheets,
/// which own cells.
///
/// Every call may fail. Implementations are driven from a single thread; none of the calls are
/// expected to be cancellable, and blocking calls (`calculate`, `refresh_all`, `run_macro`,
/// `save_as`) return when the host says they are done.
pub trait AutomationHost {
    fn configure(&mut self, options: HostOptions) -> Result<(), HostError>;

    fn open_document(&mut self, path: &Path) -> Result<DocumentId, HostError>;
    /// Create a new, unsaved document holding the host's default placeholder sheet.
    fn create_document(&mut self) -> Result<DocumentId, HostError>;
    /// File name of the document (`Report.xlsm`), used to qualify macro names.
    fn document_name(&self, doc: DocumentId) -> Result<String, HostError>;

    /// Sheet names in tab order.
    fn sheet_names(&self, doc: DocumentId) -> Result<Vec<String>, HostError>;
    fn delete_sheet(&mut self, doc: DocumentId, sheet: &str) -> Result<(), HostError>;
    fn rename_sheet(&mut self, doc: DocumentId, from: &str, to: &str) -> Result<(), HostError>;
    /// Copy `sheet` of `source` into `target` at tab `position` (0 = front).
    ///
    /// Returns the name the host gave the copy.
    fn copy_sheet(
        &mut self,
        source: DocumentId,
        sheet: &str,
        target: DocumentId,
        position: usize,
    ) -> Result<String, HostError>;

    fn cell_value(&self, doc: DocumentId, sheet: &str, cell: CellRef)
        -> Result<CellValue, HostError>;
    fn set_cell_value(
        &mut self,
        doc: DocumentId,
        sheet: &str,
        cell: CellRef,
        value: CellValue,
    ) -> Result<(), HostError>;
    /// Seek upward from the bottom of `column` to the first non-empty cell.
    ///
    /// Returns its 0-indexed row, or `None` when the column is empty.
    fn last_used_row(
        &self,
        doc: DocumentId,
        sheet: &str,
        column: ColumnRef,
    ) -> Result<Option<u32>, HostError>;

    /// Recalculate every open document.
    fn calculate(&mut self) -> Result<(), HostError>;
    /// Refresh external and derived data (queries, pivots) of `doc`.
    fn refresh_all(&mut self, doc: DocumentId) -> Result<(), HostError>;
    /// Run a macro by name. Names may be qualified with a document (`'Book.xlsm'!Module1.Run`).
    fn run_macro(&mut self, name: &str) -> Result<(), HostError>;

    fn save_as(&mut self, doc: DocumentId, path: &Path) -> Result<(), HostError>;
    fn close_document(&mut self, doc: DocumentId, save_changes: bool) -> Result<(), HostError>;
    fn quit(&mut self) -> Result<(), HostError>;
}
