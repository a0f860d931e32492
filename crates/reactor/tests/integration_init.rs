//! CLI-level coverage for `reactor init`.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn init_scaffolds_devcontainer_json() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("reactor").unwrap();
    cmd.args(["init", "--workspace-folder"]).arg(dir.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(".devcontainer/devcontainer.json"));

    assert!(dir.path().join(".devcontainer/devcontainer.json").is_file());
}

#[test]
fn init_twice_fails_with_conflict() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("reactor")
        .unwrap()
        .args(["init", "--workspace-folder"])
        .arg(dir.path())
        .assert()
        .success();

    Command::cargo_bin("reactor")
        .unwrap()
        .args(["init", "--workspace-folder"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
