use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn invpa() -> Command {
    let mut cmd = Command::cargo_bin("invpa").unwrap();
    cmd.env_remove("OPENAI_API_KEY");
    cmd
}

fn write_config(dir: &Path, api_key: &str) -> String {
    let path = dir.join("config.json");
    fs::write(
        &path,
        format!(r#"{{"api": {{"api_key": "{api_key}"}}, "company": {{"name": "My Co", "vat": "DE1"}}}}"#),
    )
    .unwrap();
    path.display().to_string()
}

#[test]
fn config_path_honours_global_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.json");

    invpa()
        .args(["--config", path.to_str().unwrap(), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.json"))
        .stdout(predicate::str::contains("not created"));
}

#[test]
fn init_then_get_and_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let path = path.to_str().unwrap();

    invpa()
        .args(["config", "init", "--output", path])
        .assert()
        .success();
    assert!(Path::new(path).exists());

    invpa()
        .args(["--config", path, "config", "get", "api.model"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gpt-4o"));

    invpa()
        .args(["--config", path, "config", "set", "pipeline.workers", "8"])
        .assert()
        .success();

    invpa()
        .args(["--config", path, "config", "get", "pipeline.workers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("8"));
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "sk-test");

    invpa()
        .args(["config", "init", "--output", &path])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn set_rejects_unknown_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "sk-test");

    invpa()
        .args(["--config", &path, "config", "set", "api.colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration key not found"));
}

#[test]
fn show_masks_api_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "sk-secret-value-9876");

    invpa()
        .args(["--config", &path, "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9876"))
        .stdout(predicate::str::contains("sk-secret").not());
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    invpa()
        .args(["--config", path.to_str().unwrap(), "process", "whatever.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn process_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "sk-test");
    let input = dir.path().join("nope.pdf");

    invpa()
        .args(["--config", &path, "process", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn process_rejects_placeholder_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "YOUR_OPENAI_API_KEY");
    let input = dir.path().join("scan.png");
    fs::write(&input, b"png").unwrap();

    invpa()
        .args(["--config", &path, "process", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("placeholder"));
}

#[test]
fn process_reports_unsupported_file_type() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "sk-test");
    let input = dir.path().join("notes.txt");
    fs::write(&input, b"hello").unwrap();

    invpa()
        .args(["--config", &path, "process", input.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unsupported file type"))
        .stderr(predicate::str::contains("No invoice could be extracted"));
}

#[test]
fn batch_without_documents_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "sk-test");
    let inputs = dir.path().join("inbox");
    fs::create_dir_all(&inputs).unwrap();
    fs::write(inputs.join("readme.md"), b"nothing here").unwrap();

    invpa()
        .args(["--config", &path, "batch", inputs.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No supported documents found"));
}
