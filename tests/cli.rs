use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("reelscribe").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn run_with_missing_url_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("reelscribe").unwrap();
    cmd.current_dir(dir.path())
        .args(["run", "does-not-exist.txt"])
        .assert()
        .failure();
}

#[test]
fn rejects_unknown_subcommand() {
    let mut cmd = Command::cargo_bin("reelscribe").unwrap();
    cmd.arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
