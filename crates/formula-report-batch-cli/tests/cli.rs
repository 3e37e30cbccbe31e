use assert_cmd::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

const SOURCE: &str = r#"{
  "schemaVersion": 1,
  "sheets": [
    {
      "name": "Template",
      "cells": {
        "E4": { "value": "Revenue" },
        "E5": { "formula": "=E4" }
      }
    },
    {
      "name": "Ref",
      "cells": {
        "A1": { "value": "Division" },
        "A2": { "value": "APAC" },
        "B2": { "value": "F1" },
        "C2": { "value": "F2" },
        "A3": { "value": "EMEA" },
        "B3": { "value": "F3" }
      }
    }
  ]
}"#;

fn write_source(dir: &Path) -> PathBuf {
    let path = dir.join("Revenue Report.xlsm");
    std::fs::write(&path, SOURCE).unwrap();
    path
}

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("formula-report-batch"))
}

#[test]
fn run_by_division_writes_the_output_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());

    let assert = cli()
        .args(["run", "--division", "APAC", "--source"])
        .arg(&source)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("F1: wrote sheet `Revenue_F1`"), "stdout:\n{stdout}");
    assert!(stdout.contains("F2: wrote sheet `Revenue_F2`"), "stdout:\n{stdout}");
    assert!(stdout.contains("run completed"), "stdout:\n{stdout}");
    assert!(dir.path().join("sample.xlsx").is_file());
}

#[test]
fn json_report_lists_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());

    let assert = cli()
        .args(["run", "--variant", "F1", "--variant", " ", "--format", "json", "--source"])
        .arg(&source)
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["variants"][0]["sheetName"], "Revenue_F1");
    assert_eq!(report["variants"][1]["status"], "skipped_empty");
}

#[test]
fn unknown_division_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());

    let assert = cli()
        .args(["run", "--division", "NOWHERE", "--source"])
        .arg(&source)
        .assert()
        .failure();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(
        stdout.contains("division `NOWHERE` not found"),
        "stdout:\n{stdout}"
    );
    assert!(!dir.path().join("sample.xlsx").exists());
}

#[test]
fn custom_layout_renames_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());
    let layout = dir.path().join("layout.json");
    std::fs::write(&layout, r#"{ "outputFileName": "emea.xlsx" }"#).unwrap();

    cli()
        .args(["run", "--division", "EMEA", "--source"])
        .arg(&source)
        .arg("--layout")
        .arg(&layout)
        .assert()
        .success();

    assert!(dir.path().join("emea.xlsx").is_file());
}

#[test]
fn divisions_lists_reference_labels() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());

    let assert = cli()
        .args(["divisions", "--source"])
        .arg(&source)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["Division", "APAC", "EMEA"]);
}

#[test]
fn division_and_variants_are_mutually_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());

    cli()
        .args(["run", "--division", "APAC", "--variant", "F1", "--source"])
        .arg(&source)
        .assert()
        .failure();
}
