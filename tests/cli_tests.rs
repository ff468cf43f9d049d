//! Command-line behavior of the `hp-engine` binary

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CURRENT_STUDY: &str = "1.2.826.0.1.3680043.8.498.100";
const PRIOR_STUDY: &str = "1.2.826.0.1.3680043.8.498.90";

fn demo_case() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/case.json")
}

fn hp_engine() -> Command {
    Command::cargo_bin("hp-engine").unwrap()
}

#[test]
fn test_catalog_list() {
    hp_engine()
        .args(["catalog", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("defaultProtocol"))
        .stdout(predicate::str::contains("ctChestCompare"))
        .stdout(predicate::str::contains("Total: 4 protocols"));
}

#[test]
fn test_catalog_list_tsv() {
    hp_engine()
        .args(["catalog", "list", "--format", "tsv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("id\tname\trules\tstages\tviewports\tpriors"))
        .stdout(predicate::str::contains("ctChestCompare\tCT Chest Compare\t2\t2\t2\t1"));
}

#[test]
fn test_catalog_show() {
    hp_engine()
        .args(["catalog", "show", "mrBrainTwoByTwo", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"protocolMatchingRules\""))
        .stdout(predicate::str::contains("\"containsI\""));

    hp_engine()
        .args(["catalog", "show", "noSuchProtocol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Protocol 'noSuchProtocol' not found"));
}

#[test]
fn test_catalog_export_then_validate() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("exported.json");

    hp_engine()
        .args(["catalog", "export"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 4 protocols"));
    assert!(output.exists());

    hp_engine()
        .args(["catalog", "validate"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Catalog OK: 4 protocols"));
}

#[test]
fn test_catalog_validate_rejects_missing_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(
        &path,
        r#"{"version": "1.0.0", "created_at": "2024-01-01T00:00:00Z", "protocols": [{"id": "lonely"}]}"#,
    )
    .unwrap();

    hp_engine()
        .args(["catalog", "validate"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("defaultProtocol"));
}

#[test]
fn test_hang_loads_prior_from_case_directory() {
    hp_engine()
        .arg("hang")
        .arg(demo_case())
        .assert()
        .success()
        .stdout(predicate::str::contains("CT Chest Compare (ctChestCompare)"))
        .stdout(predicate::str::contains("Layout:   1x2"))
        .stdout(predicate::str::contains(format!("{PRIOR_STUDY}.1")));
}

#[test]
fn test_hang_json() {
    let output = hp_engine()
        .arg("hang")
        .arg(demo_case())
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["protocolId"], "ctChestCompare");
    assert_eq!(json["stage"], 0);

    let viewports = json["update"]["viewports"].as_array().unwrap();
    assert_eq!(viewports.len(), 2);
    assert_eq!(viewports[0]["StudyInstanceUID"], CURRENT_STUDY);
    assert_eq!(viewports[1]["StudyInstanceUID"], PRIOR_STUDY);
    assert_eq!(viewports[0]["viewport"]["invert"], false);
    assert_eq!(viewports[0]["customSettings"][0]["id"], "wlPreset");
    assert_eq!(json["update"]["layout"]["numColumns"], 2);
}

#[test]
fn test_hang_without_priors_dir_contents() {
    let empty = TempDir::new().unwrap();

    let output = hp_engine()
        .arg("hang")
        .arg(demo_case())
        .arg("--priors-dir")
        .arg(empty.path())
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let viewports = json["update"]["viewports"].as_array().unwrap();
    assert_eq!(viewports[0]["StudyInstanceUID"], CURRENT_STUDY);
    assert!(viewports[1].get("StudyInstanceUID").is_none());
}

#[test]
fn test_hang_second_stage_tsv() {
    hp_engine()
        .arg("hang")
        .arg(demo_case())
        .args(["--stage", "1", "--format", "tsv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("viewport\tstudy_uid\tseries_uid\tsop_uid\timage_id"))
        .stdout(predicate::str::contains(format!("0\t{CURRENT_STUDY}\t{CURRENT_STUDY}.2\t")));
}

#[test]
fn test_rank() {
    hp_engine()
        .arg("rank")
        .arg(demo_case())
        .assert()
        .success()
        .stdout(predicate::str::contains("Best protocol: ctChestCompare (score 3)"))
        .stdout(predicate::str::contains("1 priors available"));
}

#[test]
fn test_missing_case_file() {
    hp_engine()
        .args(["hang", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read case file"));
}
