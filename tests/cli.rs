#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const SAMPLE: &str = "MACHINE ID,SYSTEM,IP ADDRESS,SUBNET MASK,GATEWAY,COMMENTS\n\
FS03,PLC,10.31.141.216,255.255.255.0,10.31.141.1,\n\
FS03,OBC,10.31.141.217,255.255.255.0,10.31.141.1,\n\
FS02,PLC,10.31.145.211,255.255.255.0,10.31.145.1,\n";

fn rignet(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rignet").unwrap();
    cmd.env("RIGNET_DATA_DIR", data_dir)
        .env_remove("RIGNET_DB")
        .env("RIGNET_LOG", "rignet=warn");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn template_csv_goes_to_stdout() {
    let tmp = tempdir().unwrap();
    let output = rignet(tmp.path()).arg("template").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.starts_with("MACHINE ID,SYSTEM,IP ADDRESS,SUBNET MASK,GATEWAY,COMMENTS"));
}

#[test]
fn template_xlsx_is_readable_by_sheets() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("template.xlsx");
    rignet(tmp.path())
        .args(["template", "--xlsx", "--out"])
        .arg(&out)
        .assert()
        .success();

    let output = rignet(tmp.path())
        .args(["sheets", "--json"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());
    let catalog = stdout_json(&output);
    assert_eq!(catalog[0]["name"], "Equipment");
    assert_eq!(catalog[0]["rowCount"], 3);
    assert_eq!(catalog[0]["hasData"], true);
}

#[test]
fn import_previews_then_commits_with_yes() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("rigs.csv");
    fs::write(&file, SAMPLE).unwrap();

    let preview = rignet(tmp.path())
        .args(["import", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(preview.status.success());
    let preview = stdout_json(&preview);
    assert_eq!(preview["groups"].as_array().unwrap().len(), 2);
    assert_eq!(preview["previewChecks"]["pass"], "preview");

    let committed = rignet(tmp.path())
        .args(["import", "--yes", "--json", "--report"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(committed.status.success());
    let result = stdout_json(&committed);
    assert_eq!(result["success"], true);
    assert_eq!(result["imported"], 2);
    assert_eq!(result["skipped"], 0);

    let reports: Vec<_> = fs::read_dir(tmp.path().join("reports"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("import-") && reports[0].ends_with(".json"));

    // Same file again: every address exists now.
    let again = rignet(tmp.path())
        .args(["import", "--yes", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(again.status.code(), Some(1));
    let result = stdout_json(&again);
    assert_eq!(result["success"], false);
    assert_eq!(result["skipped"], 3);
    assert_eq!(result["duplicates"].as_array().unwrap().len(), 3);

    let integrity = rignet(tmp.path())
        .args(["integrity", "--json"])
        .output()
        .unwrap();
    assert_eq!(integrity.status.code(), Some(0));
    let report = stdout_json(&integrity);
    assert_eq!(report["status"], "clean");
    assert_eq!(report["summary"]["totalAddresses"], 3);
}

#[test]
fn unreadable_file_fails_with_code() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("broken.xlsx");
    fs::write(&file, [0x50, 0x4B, 0x03, 0x04, 0x00, 0x01]).unwrap();

    let output = rignet(tmp.path())
        .args(["import", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let failure = stdout_json(&output);
    assert_eq!(failure["stage"], "error");
    assert_eq!(failure["failedAt"], "reading");
    assert_eq!(failure["error"]["code"], "IMPORT/INVALID_WORKBOOK");
}

#[test]
fn migrate_creates_database() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("custom").join("inventory.sqlite3");
    rignet(tmp.path())
        .args(["db", "migrate", "--db"])
        .arg(&db)
        .assert()
        .success();
    assert!(db.exists());
}

#[test]
fn file_log_is_written_under_data_dir() {
    let tmp = tempdir().unwrap();
    rignet(tmp.path())
        .env("RIGNET_LOG", "rignet=info")
        .args(["db", "migrate"])
        .assert()
        .success();

    let log = fs::read_to_string(tmp.path().join("logs").join("rignet.log")).unwrap();
    let events: Vec<Value> = log
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("json log line"))
        .collect();
    assert!(events.iter().any(|e| e["event"] == "db_open"));
    assert!(events.iter().all(|e| e["target"] == "rignet"));
}
