//! CLI-level coverage for `reactor workspace validate`, which resolves every
//! service's spec without touching a container engine.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_service(dir: &Path, name: &str) {
    let service_dir = dir.join(name);
    std::fs::create_dir_all(&service_dir).unwrap();
    std::fs::write(
        service_dir.join(".devcontainer.json"),
        r#"{ "image": "node:18" }"#,
    )
    .unwrap();
}

fn write_manifest(dir: &Path, services: &[&str]) -> std::path::PathBuf {
    let mut body = String::from("version: \"1\"\nservices:\n");
    for s in services {
        body.push_str(&format!("  {s}:\n    path: ./{s}\n"));
    }
    let path = dir.join("reactor-workspace.yml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn validate_succeeds_when_every_service_resolves() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "api");
    write_service(dir.path(), "web");
    let manifest = write_manifest(dir.path(), &["api", "web"]);

    Command::cargo_bin("reactor")
        .unwrap()
        .args(["workspace", "validate", "--manifest"])
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("api: ok"))
        .stdout(predicate::str::contains("web: ok"));
}

#[test]
fn validate_fails_when_a_service_has_no_spec() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "api");
    std::fs::create_dir_all(dir.path().join("web")).unwrap();
    let manifest = write_manifest(dir.path(), &["api", "web"]);

    Command::cargo_bin("reactor")
        .unwrap()
        .args(["workspace", "validate", "--manifest"])
        .arg(&manifest)
        .assert()
        .failure()
        .stdout(predicate::str::contains("api: ok"))
        .stderr(predicate::str::contains("web:"));
}

#[test]
fn validate_fails_when_manifest_missing() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("reactor")
        .unwrap()
        .args(["workspace", "validate", "--manifest"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("reactor-workspace.yml"));
}
