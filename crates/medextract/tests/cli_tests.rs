//! End-to-end tests for the medextract binary
//!
//! These tests validate:
//! - Argument parsing and help output
//! - run / merge / status against a real output directory
//! - Config file layering
//! - Error reporting and exit codes

mod common;

use assert_cmd::Command;
use common::*;
use medextract::codec::tags;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "MEDEXTRACT_CONFIG",
    "MEDEXTRACT_INPUT",
    "MEDEXTRACT_OUTPUT",
    "MEDEXTRACT_WORKERS",
    "MEDEXTRACT_BATCH_SIZE",
    "MEDEXTRACT_SAVE_IMAGES",
    "MEDEXTRACT_STRATEGY_SET",
    "MEDEXTRACT_EXTENSION",
];

fn medextract() -> Command {
    let mut cmd = Command::cargo_bin("medextract").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Three planar images under `root`
fn fixture_tree(root: &Path) {
    for n in 1..=3u16 {
        DicomFixture::new()
            .text(tags::SOP_CLASS_UID, *b"UI", DX)
            .text(tags::SOP_INSTANCE_UID, *b"UI", &format!("1.2.9.{}", n))
            .text(tags::MODALITY, *b"CS", "DX")
            .text(tags::PATIENT_ID, *b"LO", "CLI-1")
            .image(2, 2, &[n, n, n, n])
            .write(&root.join(format!("dx/{}.dcm", n)));
    }
}

// ============================================================================
// Help and argument errors
// ============================================================================

#[test]
fn test_help_lists_commands() {
    medextract()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("discover"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_no_arguments_prints_usage() {
    medextract()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_strategy_set_rejected() {
    medextract()
        .args(["status", "--strategy-set", "everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("everything"));
}

#[test]
fn test_missing_input_directory_fails() {
    let temp = TempDir::new().unwrap();
    medextract()
        .arg("run")
        .arg("--input")
        .arg(temp.path().join("absent"))
        .arg("--output")
        .arg(temp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_merge_requires_output() {
    medextract()
        .arg("merge")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Output directory is required"));
}

#[test]
fn test_config_file_with_unknown_field_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.json");
    fs::write(&config, r#"{"DICOMHome": "/in", "HashSeed": 7}"#).unwrap();
    medextract()
        .arg("status")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("HashSeed"));
}

// ============================================================================
// Commands against an output directory
// ============================================================================

#[test]
fn test_status_on_fresh_output() {
    let temp = TempDir::new().unwrap();
    medextract()
        .arg("status")
        .arg("--output")
        .arg(temp.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshot"))
        .stdout(predicate::str::contains("Next batch id: 0"));
}

#[test]
fn test_run_then_status_and_merge() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    let output = temp.path().join("out");
    fixture_tree(&input);

    medextract()
        .arg("run")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["-j", "2", "--batch-size", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Extraction complete"))
        .stdout(predicate::str::contains("3 rows in 2 batches"));

    let catalog = Table::read(&output.join("meta/catalog.csv"));
    assert_eq!(catalog.rows.len(), 3);
    assert!(catalog
        .column("artifactPath")
        .iter()
        .all(|p| p.ends_with(".png") && Path::new(p).exists()));
    assert!(output.join("worklist.json").exists());

    medextract()
        .arg("status")
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Batches:       2"))
        .stdout(predicate::str::contains("Remaining:     0"));

    fs::remove_file(output.join("meta/catalog.csv")).unwrap();
    medextract()
        .arg("merge")
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 rows from 2 batches"));
    assert_eq!(Table::read(&output.join("meta/catalog.csv")).rows.len(), 3);
}

#[test]
fn test_discover_writes_snapshot() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    let output = temp.path().join("out");
    fixture_tree(&input);

    medextract()
        .arg("discover")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Planar"))
        .stdout(predicate::str::contains("3"));
    assert!(output.join("worklist.json").exists());
    assert!(!output.join("meta/catalog.csv").exists());
}

#[test]
fn test_config_file_supplies_directories() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    let output = temp.path().join("out");
    fixture_tree(&input);

    let config = temp.path().join("config.json");
    let body = serde_json::json!({
        "DICOMHome": input,
        "OutputDirectory": output,
        "NumProcesses": 1,
        "SaveImages": false,
    });
    fs::write(&config, body.to_string()).unwrap();

    medextract()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    let catalog = Table::read(&output.join("meta/catalog.csv"));
    assert_eq!(catalog.rows.len(), 3);
    assert!(catalog.column("artifactPath").iter().all(String::is_empty));
}
