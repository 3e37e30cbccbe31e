use std::path::Path;

use formula_automation::{
    AutomationHost, CellRef, CellValue, ColumnRef, HostCall, HostError, InMemoryHost, WorkbookFile,
};
use pretty_assertions::assert_eq;

const WORKBOOK: &str = r#"{
  "schemaVersion": 1,
  "sheets": [
    {
      "name": "Template",
      "cells": {
        "E5": { "formula": "=\"Revenue \"&E6" },
        "E6": { "value": "F0" }
      }
    },
    {
      "name": "Ref",
      "cells": {
        "A1": { "value": "Division" },
        "A2": { "value": "APAC" },
        "A4": { "value": "EMEA" },
        "B4": { "value": 100 }
      }
    }
  ],
  "macros": [
    {
      "name": "Module1.Stamp",
      "actions": [
        { "action": "copyValue", "sheet": "Template", "from": "E6", "to": "H1" },
        { "action": "setValue", "sheet": "Template", "cell": "H2", "value": true }
      ]
    },
    { "name": "Module1.Broken", "actions": [{ "action": "fail", "message": "type mismatch" }] }
  ]
}"#;

fn write_workbook(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("Revenue Report.xlsm");
    std::fs::write(&path, WORKBOOK).unwrap();
    path
}

fn cell(a1: &str) -> CellRef {
    CellRef::from_a1(a1).unwrap()
}

#[test]
fn opens_workbook_files_and_recalculates() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path());
    let mut host = InMemoryHost::new();

    let doc = host.open_document(&path).unwrap();
    assert_eq!(host.document_name(doc).unwrap(), "Revenue Report.xlsm");
    assert_eq!(host.sheet_names(doc).unwrap(), vec!["Template", "Ref"]);

    host.set_cell_value(doc, "Template", cell("E6"), CellValue::from("F7"))
        .unwrap();
    host.calculate().unwrap();

    assert_eq!(
        host.cell_value(doc, "template", cell("E5")).unwrap(),
        CellValue::from("Revenue F7")
    );
}

#[test]
fn document_snapshots_track_edits_and_keep_formulas() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path());
    let mut host = InMemoryHost::new();
    let doc = host.open_document(&path).unwrap();

    let opened = host.document(doc).unwrap();
    assert_eq!(opened.path(), Some(path.as_path()));
    assert!(opened.is_saved());

    host.set_cell_value(doc, "Template", cell("E6"), CellValue::from("F7"))
        .unwrap();
    let edited = host.document(doc).unwrap();
    assert!(!edited.is_saved());
    assert_eq!(
        edited.formula_a1("Template", "E5").unwrap().as_deref(),
        Some("=\"Revenue \"&E6")
    );
    assert_eq!(edited.formula_a1("Template", "E6").unwrap(), None);

    host.close_document(doc, false).unwrap();
    assert!(host.document(doc).is_none());
}

#[test]
fn last_used_row_seeks_from_the_bottom() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path());
    let mut host = InMemoryHost::new();
    let doc = host.open_document(&path).unwrap();

    let a = ColumnRef::from_letters("A").unwrap();
    let c = ColumnRef::from_letters("C").unwrap();
    assert_eq!(host.last_used_row(doc, "Ref", a).unwrap(), Some(3));
    assert_eq!(host.last_used_row(doc, "Ref", c).unwrap(), None);
}

#[test]
fn copies_sheets_with_excel_style_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path());
    let mut host = InMemoryHost::new();
    let source = host.open_document(&path).unwrap();
    let output = host.create_document().unwrap();

    let first = host.copy_sheet(source, "Template", output, 0).unwrap();
    let second = host.copy_sheet(source, "Template", output, 0).unwrap();

    assert_eq!(first, "Template");
    assert_eq!(second, "Template (2)");
    assert_eq!(
        host.sheet_names(output).unwrap(),
        vec!["Template (2)", "Template", "Sheet1"]
    );
    assert_eq!(
        host.cell_value(output, "Template (2)", cell("E6")).unwrap(),
        CellValue::from("F0")
    );
}

#[test]
fn rename_rejects_duplicates_and_invalid_names() {
    let mut host = InMemoryHost::new();
    let doc = host.create_document().unwrap();
    let source = host.create_document().unwrap();
    host.copy_sheet(source, "Sheet1", doc, 0).unwrap();

    assert!(matches!(
        host.rename_sheet(doc, "Sheet1 (2)", "SHEET1"),
        Err(HostError::DuplicateSheetName(_))
    ));
    assert!(matches!(
        host.rename_sheet(doc, "Sheet1 (2)", "a:b"),
        Err(HostError::InvalidSheetName { .. })
    ));
    host.rename_sheet(doc, "Sheet1 (2)", "Report_F1").unwrap();
    assert_eq!(host.sheet_names(doc).unwrap(), vec!["Report_F1", "Sheet1"]);
}

#[test]
fn refuses_to_delete_the_last_sheet() {
    let mut host = InMemoryHost::new();
    let doc = host.create_document().unwrap();
    assert!(matches!(
        host.delete_sheet(doc, "Sheet1"),
        Err(HostError::LastSheet(_))
    ));
}

#[test]
fn runs_workbook_and_registered_macros() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path());
    let mut host = InMemoryHost::new();
    let doc = host.open_document(&path).unwrap();

    host.run_macro("'Revenue Report.xlsm'!module1.stamp").unwrap();
    assert_eq!(
        host.cell_value(doc, "Template", cell("H1")).unwrap(),
        CellValue::from("F0")
    );
    assert_eq!(
        host.cell_value(doc, "Template", cell("H2")).unwrap(),
        CellValue::Bool(true)
    );

    let err = host.run_macro("Module1.Broken").unwrap_err();
    assert!(matches!(err, HostError::MacroFailed { ref message, .. } if message == "type mismatch"));

    host.register_macro("Module2.Touch", |doc| {
        doc.set_value_a1("Template", "Z1", "touched")
            .map_err(|e| e.to_string())
    });
    host.run_macro("'Revenue Report.xlsm'!Module2.Touch").unwrap();
    assert_eq!(
        host.cell_value(doc, "Template", cell("Z1")).unwrap(),
        CellValue::from("touched")
    );

    assert!(matches!(
        host.run_macro("'Other.xlsm'!Module1.Stamp"),
        Err(HostError::MacroNotFound(_))
    ));
}

#[test]
fn save_as_writes_a_reloadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = InMemoryHost::new();
    let doc = host.create_document().unwrap();
    host.set_cell_value(doc, "Sheet1", cell("B2"), CellValue::Number(42.0))
        .unwrap();

    let out = dir.path().join("sample.xlsx");
    host.save_as(doc, &out).unwrap();
    assert_eq!(host.document_name(doc).unwrap(), "sample.xlsx");
    let snapshot = host.document(doc).unwrap();
    assert_eq!(snapshot.path(), Some(out.as_path()));
    assert!(snapshot.is_saved());
    host.close_document(doc, false).unwrap();
    host.quit().unwrap();

    let saved = WorkbookFile::read(&out).unwrap();
    assert_eq!(
        saved.sheet("Sheet1").unwrap().value("B2"),
        Some(&serde_json::json!(42.0))
    );
    assert_eq!(
        host.calls().last(),
        Some(&HostCall::Quit),
        "quit is recorded as the final call"
    );
}

#[test]
fn save_as_into_a_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = InMemoryHost::new();
    let doc = host.create_document().unwrap();
    let out = dir.path().join("missing").join("sample.xlsx");
    assert!(matches!(
        host.save_as(doc, &out),
        Err(HostError::Io { .. })
    ));
}
