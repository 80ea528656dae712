use assert_cmd::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// `--json` mode prints a single structured error object to stdout instead of
/// a human-readable message on stderr.
#[test]
fn json_error_schema_on_missing_device_id() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("scale_device").unwrap();
    cmd.env_remove("SCALE_DEVICE_ID");
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("--state-dir")
        .arg(dir.path())
        .arg("run");

    let out = cmd.assert().failure().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().next().unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");

    assert_eq!(v.get("reason").and_then(|x| x.as_str()), Some("Error"));
    assert!(v.get("exit_code").and_then(|x| x.as_i64()).is_some());
    let message = v.get("message").and_then(|x| x.as_str()).unwrap_or("");
    assert!(message.contains("device-id"));
}

/// Without `--json`, the same failure goes to stderr as plain text, not JSON.
#[test]
fn plain_error_is_not_json_on_stdout() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("scale_device").unwrap();
    cmd.env_remove("SCALE_DEVICE_ID");
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--state-dir")
        .arg(dir.path())
        .arg("run");

    let assert = cmd.assert().failure();
    let out = assert.get_output().stdout.clone();
    assert!(out.is_empty(), "unexpected stdout: {:?}", String::from_utf8_lossy(&out));
}
