use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::address::{CellRef, ColumnRef};
use crate::formula::{evaluate, parse_formula};
use crate::host::{AutomationHost, DocumentId, HostError, HostOp, HostOptions};
use crate::sheet_name::{sheet_name_eq_case_insensitive, validate_sheet_name};
use crate::value::CellValue;
use crate::workbook_file::{
    CellFile, MacroAction, MacroDef, SheetFile, WorkbookFile, WORKBOOK_FILE_SCHEMA_VERSION,
};

/// Name of the sheet every new document starts with.
pub const PLACEHOLDER_SHEET_NAME: &str = "Sheet1";

/// A macro implemented in Rust, run against the document it is qualified with.
pub type MacroFn = Rc<dyn Fn(&mut MemoryDocument) -> Result<(), String>>;

/// A call made against an [`InMemoryHost`], in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Configure(HostOptions),
    OpenDocument { path: PathBuf },
    CreateDocument,
    DeleteSheet { doc: DocumentId, sheet: String },
    RenameSheet { doc: DocumentId, from: String, to: String },
    CopySheet {
        source: DocumentId,
        sheet: String,
        target: DocumentId,
        position: usize,
    },
    SetCellValue {
        doc: DocumentId,
        sheet: String,
        cell: CellRef,
        value: CellValue,
    },
    Calculate,
    RefreshAll { doc: DocumentId },
    RunMacro { name: String },
    SaveAs { doc: DocumentId, path: PathBuf },
    CloseDocument { doc: DocumentId, save_changes: bool },
    Quit,
}

#[derive(Debug, Clone)]
struct Fault {
    op: HostOp,
    /// `None` fails every matching call.
    remaining: Option<u32>,
    message: String,
}

#[derive(Debug, Clone, Default)]
struct MemoryCell {
    value: CellValue,
    formula: Option<String>,
}

#[derive(Debug, Clone)]
struct MemorySheet {
    name: String,
    cells: BTreeMap<CellRef, MemoryCell>,
}

impl MemorySheet {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
        }
    }
}

/// A document held by [`InMemoryHost`].
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    name: String,
    path: Option<PathBuf>,
    sheets: Vec<MemorySheet>,
    macros: Vec<MacroDef>,
    saved: bool,
}

impl MemoryDocument {
    fn untitled(name: String) -> Self {
        Self {
            name,
            path: None,
            sheets: vec![MemorySheet::new(PLACEHOLDER_SHEET_NAME)],
            macros: Vec::new(),
            saved: false,
        }
    }

    fn from_file(path: &Path, file: WorkbookFile) -> Result<Self, HostError> {
        let mut sheets = Vec::with_capacity(file.sheets.len());
        for sheet in file.sheets {
            let mut cells = BTreeMap::new();
            for (a1, cell) in sheet.cells {
                let cell_ref = parse_cell(&a1)?;
                let value = CellValue::from_json(cell.value.as_ref());
                if value != CellValue::Empty || cell.formula.is_some() {
                    cells.insert(
                        cell_ref,
                        MemoryCell {
                            value,
                            formula: cell.formula,
                        },
                    );
                }
            }
            sheets.push(MemorySheet {
                name: sheet.name,
                cells,
            });
        }
        if sheets.is_empty() {
            sheets.push(MemorySheet::new(PLACEHOLDER_SHEET_NAME));
        }

        Ok(Self {
            name: file_name(path),
            path: Some(path.to_path_buf()),
            sheets,
            macros: file.macros,
            saved: true,
        })
    }

    pub fn to_file(&self) -> WorkbookFile {
        let sheets = self
            .sheets
            .iter()
            .map(|sheet| SheetFile {
                name: sheet.name.clone(),
                cells: sheet
                    .cells
                    .iter()
                    .map(|(cell, state)| {
                        (
                            cell.to_a1(),
                            CellFile {
                                value: state.value.to_json(),
                                formula: state.formula.clone(),
                            },
                        )
                    })
                    .collect(),
            })
            .collect();
        WorkbookFile {
            schema_version: WORKBOOK_FILE_SCHEMA_VERSION,
            sheets,
            macros: self.macros.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `true` when there are no changes since the document was opened or last saved.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn value(&self, sheet: &str, cell: CellRef) -> Result<CellValue, HostError> {
        let sheet = self.sheet(sheet)?;
        Ok(sheet
            .cells
            .get(&cell)
            .map(|c| c.value.clone())
            .unwrap_or_default())
    }

    pub fn value_a1(&self, sheet: &str, a1: &str) -> Result<CellValue, HostError> {
        self.value(sheet, parse_cell(a1)?)
    }

    pub fn formula_a1(&self, sheet: &str, a1: &str) -> Result<Option<String>, HostError> {
        let cell = parse_cell(a1)?;
        Ok(self
            .sheet(sheet)?
            .cells
            .get(&cell)
            .and_then(|c| c.formula.clone()))
    }

    /// Set a literal value, clearing any formula.
    pub fn set_value(
        &mut self,
        sheet: &str,
        cell: CellRef,
        value: CellValue,
    ) -> Result<(), HostError> {
        let sheet = self.sheet_mut(sheet)?;
        if value == CellValue::Empty {
            sheet.cells.remove(&cell);
        } else {
            sheet.cells.insert(
                cell,
                MemoryCell {
                    value,
                    formula: None,
                },
            );
        }
        self.saved = false;
        Ok(())
    }

    pub fn set_value_a1(
        &mut self,
        sheet: &str,
        a1: &str,
        value: impl Into<CellValue>,
    ) -> Result<(), HostError> {
        self.set_value(sheet, parse_cell(a1)?, value.into())
    }

    pub fn set_formula_a1(&mut self, sheet: &str, a1: &str, formula: &str) -> Result<(), HostError> {
        let cell = parse_cell(a1)?;
        let sheet = self.sheet_mut(sheet)?;
        sheet.cells.entry(cell).or_default().formula = Some(formula.to_string());
        self.saved = false;
        Ok(())
    }

    /// Re-evaluate every formula cell until values stop changing.
    ///
    /// Formulas outside the supported subset, or referencing sheets this document does not have,
    /// keep their cached value.
    pub fn recalculate(&mut self) {
        let formulas: Vec<(usize, CellRef, Vec<_>)> = self
            .sheets
            .iter()
            .enumerate()
            .flat_map(|(idx, sheet)| {
                sheet.cells.iter().filter_map(move |(cell, state)| {
                    let ops = parse_formula(state.formula.as_deref()?)?;
                    Some((idx, *cell, ops))
                })
            })
            .collect();

        // Chains of references settle in at most one pass per formula.
        for _ in 0..=formulas.len() {
            let mut changed = false;
            for (sheet_idx, cell, ops) in &formulas {
                let Some(value) = evaluate(ops, |sheet, at| {
                    let target = match sheet {
                        Some(name) => self
                            .sheets
                            .iter()
                            .find(|s| sheet_name_eq_case_insensitive(&s.name, name))?,
                        None => &self.sheets[*sheet_idx],
                    };
                    Some(
                        target
                            .cells
                            .get(&at)
                            .map(|c| c.value.clone())
                            .unwrap_or_default(),
                    )
                }) else {
                    continue;
                };
                if let Some(state) = self.sheets[*sheet_idx].cells.get_mut(cell) {
                    if state.value != value {
                        state.value = value;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| sheet_name_eq_case_insensitive(&s.name, name))
    }

    fn sheet(&self, name: &str) -> Result<&MemorySheet, HostError> {
        self.sheet_index(name)
            .map(|idx| &self.sheets[idx])
            .ok_or_else(|| self.unknown_sheet(name))
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut MemorySheet, HostError> {
        match self.sheet_index(name) {
            Some(idx) => Ok(&mut self.sheets[idx]),
            None => Err(self.unknown_sheet(name)),
        }
    }

    fn unknown_sheet(&self, name: &str) -> HostError {
        HostError::UnknownSheet {
            document: self.name.clone(),
            sheet: name.to_string(),
        }
    }

    fn find_macro(&self, name: &str) -> Option<&MacroDef> {
        self.macros
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    fn run_actions(&mut self, def: &MacroDef) -> Result<(), HostError> {
        let failed = |message: String| HostError::MacroFailed {
            name: def.name.clone(),
            message,
        };
        for action in &def.actions {
            match action {
                MacroAction::SetValue { sheet, cell, value } => {
                    let cell = CellRef::from_a1(cell).map_err(|e| failed(e.to_string()))?;
                    self.set_value(sheet, cell, CellValue::from_json(Some(value)))
                        .map_err(|e| failed(e.to_string()))?;
                }
                MacroAction::CopyValue { sheet, from, to } => {
                    let from = CellRef::from_a1(from).map_err(|e| failed(e.to_string()))?;
                    let to = CellRef::from_a1(to).map_err(|e| failed(e.to_string()))?;
                    let value = self.value(sheet, from).map_err(|e| failed(e.to_string()))?;
                    self.set_value(sheet, to, value)
                        .map_err(|e| failed(e.to_string()))?;
                }
                MacroAction::Fail { message } => return Err(failed(message.clone())),
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct HostState {
    running: bool,
    options: HostOptions,
    next_id: u64,
    untitled: u32,
    documents: BTreeMap<DocumentId, MemoryDocument>,
    macros: HashMap<String, MacroFn>,
    calls: Vec<HostCall>,
    faults: Vec<Fault>,
}

impl HostState {
    fn begin(&mut self, op: HostOp, call: Option<HostCall>) -> Result<(), HostError> {
        if let Some(call) = call {
            self.calls.push(call);
        }
        if !self.running {
            return Err(HostError::NotRunning);
        }
        self.take_fault(op)
    }

    fn take_fault(&mut self, op: HostOp) -> Result<(), HostError> {
        let Some(idx) = self.faults.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        let fault = &mut self.faults[idx];
        let message = fault.message.clone();
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.faults.remove(idx);
            }
        }
        Err(HostError::Injected { op, message })
    }

    fn document(&self, doc: DocumentId) -> Result<&MemoryDocument, HostError> {
        self.documents
            .get(&doc)
            .ok_or(HostError::UnknownDocument(doc))
    }

    fn document_mut(&mut self, doc: DocumentId) -> Result<&mut MemoryDocument, HostError> {
        self.documents
            .get_mut(&doc)
            .ok_or(HostError::UnknownDocument(doc))
    }

    fn insert(&mut self, document: MemoryDocument) -> DocumentId {
        self.next_id += 1;
        let id = DocumentId(self.next_id);
        self.documents.insert(id, document);
        id
    }
}

/// An [`AutomationHost`] that keeps documents in memory and persists them as
/// [`WorkbookFile`] JSON.
///
/// Handles are cheap clones sharing one host, so a caller can keep a handle for inspection while
/// a session owns another. Every call is recorded (see [`InMemoryHost::calls`]) and failures can be
/// injected per operation.
#[derive(Clone)]
pub struct InMemoryHost {
    state: Rc<RefCell<HostState>>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("InMemoryHost")
            .field("running", &state.running)
            .field("documents", &state.documents.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl InMemoryHost {
    /// A running host with no open documents.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HostState {
                running: true,
                ..HostState::default()
            })),
        }
    }

    /// Register a Rust macro. `name` is the unqualified procedure name (`Module1.Refresh`).
    pub fn register_macro(
        &self,
        name: &str,
        f: impl Fn(&mut MemoryDocument) -> Result<(), String> + 'static,
    ) {
        self.state
            .borrow_mut()
            .macros
            .insert(name.to_ascii_lowercase(), Rc::new(f));
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_next(&self, op: HostOp, times: u32, message: &str) {
        if times == 0 {
            return;
        }
        self.state.borrow_mut().faults.push(Fault {
            op,
            remaining: Some(times),
            message: message.to_string(),
        });
    }

    /// Fail every call of `op` from now on.
    pub fn fail_always(&self, op: HostOp, message: &str) {
        self.state.borrow_mut().faults.push(Fault {
            op,
            remaining: None,
            message: message.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.borrow().calls.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    pub fn options(&self) -> HostOptions {
        self.state.borrow().options
    }

    pub fn open_documents(&self) -> Vec<DocumentId> {
        self.state.borrow().documents.keys().copied().collect()
    }

    /// Snapshot of an open document.
    pub fn document(&self, doc: DocumentId) -> Option<MemoryDocument> {
        self.state.borrow().documents.get(&doc).cloned()
    }
}

impl AutomationHost for InMemoryHost {
    fn configure(&mut self, options: HostOptions) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::Configure, Some(HostCall::Configure(options)))?;
        state.options = options;
        Ok(())
    }

    fn open_document(&mut self, path: &Path) -> Result<DocumentId, HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::OpenDocument,
            Some(HostCall::OpenDocument {
                path: path.to_path_buf(),
            }),
        )?;
        let file = WorkbookFile::read(path)?;
        let document = MemoryDocument::from_file(path, file)?;
        log::debug!("opened `{}`", document.name);
        Ok(state.insert(document))
    }

    fn create_document(&mut self) -> Result<DocumentId, HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::CreateDocument, Some(HostCall::CreateDocument))?;
        state.untitled += 1;
        let name = format!("Book{}", state.untitled);
        Ok(state.insert(MemoryDocument::untitled(name)))
    }

    fn document_name(&self, doc: DocumentId) -> Result<String, HostError> {
        let state = self.state.borrow();
        if !state.running {
            return Err(HostError::NotRunning);
        }
        Ok(state.document(doc)?.name.clone())
    }

    fn sheet_names(&self, doc: DocumentId) -> Result<Vec<String>, HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::SheetNames, None)?;
        Ok(state.document(doc)?.sheet_names())
    }

    fn delete_sheet(&mut self, doc: DocumentId, sheet: &str) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::DeleteSheet,
            Some(HostCall::DeleteSheet {
                doc,
                sheet: sheet.to_string(),
            }),
        )?;
        let document = state.document_mut(doc)?;
        let idx = document
            .sheet_index(sheet)
            .ok_or_else(|| document.unknown_sheet(sheet))?;
        if document.sheets.len() == 1 {
            return Err(HostError::LastSheet(sheet.to_string()));
        }
        document.sheets.remove(idx);
        document.saved = false;
        Ok(())
    }

    fn rename_sheet(&mut self, doc: DocumentId, from: &str, to: &str) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::RenameSheet,
            Some(HostCall::RenameSheet {
                doc,
                from: from.to_string(),
                to: to.to_string(),
            }),
        )?;
        validate_sheet_name(to).map_err(|source| HostError::InvalidSheetName {
            name: to.to_string(),
            source,
        })?;
        let document = state.document_mut(doc)?;
        let idx = document
            .sheet_index(from)
            .ok_or_else(|| document.unknown_sheet(from))?;
        if let Some(existing) = document.sheet_index(to) {
            if existing != idx {
                return Err(HostError::DuplicateSheetName(to.to_string()));
            }
        }
        document.sheets[idx].name = to.to_string();
        document.saved = false;
        Ok(())
    }

    fn copy_sheet(
        &mut self,
        source: DocumentId,
        sheet: &str,
        target: DocumentId,
        position: usize,
    ) -> Result<String, HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::CopySheet,
            Some(HostCall::CopySheet {
                source,
                sheet: sheet.to_string(),
                target,
                position,
            }),
        )?;
        let mut copy = state.document(source)?.sheet(sheet)?.clone();
        let document = state.document_mut(target)?;

        // Same naming scheme as Excel: `Template`, then `Template (2)`, `Template (3)`, ...
        let base = copy.name.clone();
        let mut n = 1;
        while document.sheet_index(&copy.name).is_some() {
            n += 1;
            copy.name = format!("{base} ({n})");
        }

        let name = copy.name.clone();
        let position = position.min(document.sheets.len());
        document.sheets.insert(position, copy);
        document.saved = false;
        Ok(name)
    }

    fn cell_value(
        &self,
        doc: DocumentId,
        sheet: &str,
        cell: CellRef,
    ) -> Result<CellValue, HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::CellValue, None)?;
        state.document(doc)?.value(sheet, cell)
    }

    fn set_cell_value(
        &mut self,
        doc: DocumentId,
        sheet: &str,
        cell: CellRef,
        value: CellValue,
    ) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::SetCellValue,
            Some(HostCall::SetCellValue {
                doc,
                sheet: sheet.to_string(),
                cell,
                value: value.clone(),
            }),
        )?;
        state.document_mut(doc)?.set_value(sheet, cell, value)
    }

    fn last_used_row(
        &self,
        doc: DocumentId,
        sheet: &str,
        column: ColumnRef,
    ) -> Result<Option<u32>, HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::LastUsedRow, None)?;
        let sheet = state.document(doc)?.sheet(sheet)?;
        Ok(sheet
            .cells
            .iter()
            .rev()
            .find(|(cell, state)| cell.col == column.index() && state.value != CellValue::Empty)
            .map(|(cell, _)| cell.row))
    }

    fn calculate(&mut self) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::Calculate, Some(HostCall::Calculate))?;
        for document in state.documents.values_mut() {
            document.recalculate();
        }
        Ok(())
    }

    fn refresh_all(&mut self, doc: DocumentId) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::RefreshAll, Some(HostCall::RefreshAll { doc }))?;
        // No external connections: refreshing derived data is a recalculation of this document.
        state.document_mut(doc)?.recalculate();
        Ok(())
    }

    fn run_macro(&mut self, name: &str) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::RunMacro,
            Some(HostCall::RunMacro {
                name: name.to_string(),
            }),
        )?;

        let (qualifier, procedure) = split_macro_name(name);
        let candidates: Vec<DocumentId> = match qualifier {
            Some(qualifier) => state
                .documents
                .iter()
                .filter(|(_, d)| d.name.eq_ignore_ascii_case(qualifier))
                .map(|(id, _)| *id)
                .collect(),
            None => state.documents.keys().copied().collect(),
        };
        let Some(&first) = candidates.first() else {
            return Err(HostError::MacroNotFound(name.to_string()));
        };

        for id in &candidates {
            let document = state.document_mut(*id)?;
            if let Some(def) = document.find_macro(procedure).cloned() {
                return document.run_actions(&def);
            }
        }

        let Some(f) = state.macros.get(&procedure.to_ascii_lowercase()).cloned() else {
            return Err(HostError::MacroNotFound(name.to_string()));
        };
        let document = state.document_mut(first)?;
        f(document).map_err(|message| HostError::MacroFailed {
            name: name.to_string(),
            message,
        })
    }

    fn save_as(&mut self, doc: DocumentId, path: &Path) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::SaveAs,
            Some(HostCall::SaveAs {
                doc,
                path: path.to_path_buf(),
            }),
        )?;
        let document = state.document_mut(doc)?;
        document.to_file().write(path)?;
        document.name = file_name(path);
        document.path = Some(path.to_path_buf());
        document.saved = true;
        Ok(())
    }

    fn close_document(&mut self, doc: DocumentId, save_changes: bool) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(
            HostOp::CloseDocument,
            Some(HostCall::CloseDocument { doc, save_changes }),
        )?;
        let document = state.document(doc)?;
        if save_changes && !document.saved {
            let path = document
                .path
                .clone()
                .ok_or_else(|| HostError::NoSavePath(document.name.clone()))?;
            document.to_file().write(&path)?;
        }
        state.documents.remove(&doc);
        Ok(())
    }

    fn quit(&mut self) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.begin(HostOp::Quit, Some(HostCall::Quit))?;
        state.running = false;
        state.documents.clear();
        Ok(())
    }
}

/// Split `'Book.xlsm'!Module1.Run` into (`Book.xlsm`, `Module1.Run`).
fn split_macro_name(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('!') {
        Some((qualifier, procedure)) => {
            let qualifier = qualifier.trim();
            let qualifier = qualifier
                .strip_prefix('\'')
                .and_then(|q| q.strip_suffix('\''))
                .unwrap_or(qualifier);
            (Some(qualifier), procedure.trim())
        }
        None => (None, name.trim()),
    }
}

fn parse_cell(a1: &str) -> Result<CellRef, HostError> {
    CellRef::from_a1(a1).map_err(|source| HostError::InvalidCell {
        text: a1.to_string(),
        source,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
