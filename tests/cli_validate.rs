#![cfg(unix)]

mod common;

use std::fs;
use std::process::Command;

#[test]
fn validate_checks_without_touching_the_case_folder() {
    let scratch = tempfile::tempdir().unwrap();
    let case = common::case_folder(scratch.path());
    let master = scratch.path().join("aero force sheet.xlsx");
    common::write_master(&master, "v1.0");

    let config = scratch.path().join("postproc.json");
    let json = serde_json::json!({ "template": { "master": master } });
    fs::write(&config, json.to_string()).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_postproc"))
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .arg(&case)
        .env_remove("POSTPROC_TEMPLATE")
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("car.cas.h5"));
    assert!(!case.join("processed").exists());
}

#[test]
fn validate_rejects_a_stale_template() {
    let scratch = tempfile::tempdir().unwrap();
    let case = common::case_folder(scratch.path());
    let master = scratch.path().join("aero force sheet.xlsx");
    common::write_master(&master, "v0.9");

    let output = Command::new(env!("CARGO_BIN_EXE_postproc"))
        .arg("validate")
        .arg(&case)
        .env("POSTPROC_TEMPLATE", &master)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!case.join("processed").exists());
}
