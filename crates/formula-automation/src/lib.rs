//! `formula-automation` is the boundary between batch tooling and a stateful spreadsheet
//! application driven from the outside (Excel over COM, LibreOffice over UNO, or the in-memory
//! host shipped here).
//!
//! The crate exposes:
//! - [`AutomationHost`], the object model batch jobs drive: documents, sheets, cells, macros,
//!   recalculation, and save/close/quit.
//! - [`CellRef`]/[`ColumnRef`] A1 coordinates and [`CellValue`] scalars.
//! - [`InMemoryHost`], a host that keeps documents in memory and stores them as JSON
//!   [`WorkbookFile`]s. It records every call and supports fault injection, which makes it the
//!   host of choice for tests.

mod address;
mod formula;
mod host;
mod memory;
mod sheet_name;
mod value;
mod workbook_file;

pub use crate::address::{A1ParseError, CellRef, ColumnRef, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use crate::host::{AutomationHost, DocumentId, HostError, HostOp, HostOptions};
pub use crate::memory::{HostCall, InMemoryHost, MacroFn, MemoryDocument, PLACEHOLDER_SHEET_NAME};
pub use crate::sheet_name::{
    sheet_name_eq_case_insensitive, validate_sheet_name, SheetNameError,
    EXCEL_MAX_SHEET_NAME_LEN, FORBIDDEN_SHEET_NAME_CHARS,
};
pub use crate::value::CellValue;
pub use crate::workbook_file::{
    CellFile, MacroAction, MacroDef, SheetFile, WorkbookFile, WORKBOOK_FILE_SCHEMA_VERSION,
};
