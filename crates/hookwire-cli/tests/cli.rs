//! Integration tests for the `hookwire` binary.
//!
//! These cover argument handling and bundle validation; sessions against a
//! real plugin live in the end-to-end crate.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn bundle_root() -> TempDir {
    TempDir::new().expect("create bundle root")
}

fn root_arg(dir: &TempDir) -> String {
    dir.path().to_str().expect("utf-8 temp path").to_owned()
}

#[rstest]
fn help_succeeds() {
    let mut command = cargo_bin_cmd!("hookwire");
    command.arg("--help");
    command.assert().success().stdout(contains("Supervises a plugin bundle"));
}

#[rstest]
fn check_reports_the_resolved_executable(bundle_root: TempDir) {
    let mut command = cargo_bin_cmd!("hookwire");
    command.args(["check", "--root", &root_arg(&bundle_root)]);
    command.args(["--id", "demo", "--executable", "/bin/../plugin"]);
    command
        .assert()
        .success()
        .stdout(contains(r#""plugin":"demo""#))
        .stdout(contains("/plugin\""));
}

#[rstest]
fn check_rejects_escaping_paths(bundle_root: TempDir) {
    let mut command = cargo_bin_cmd!("hookwire");
    command.args(["check", "--root", &root_arg(&bundle_root)]);
    command.args(["--id", "demo", "--executable", "../../backend.exe"]);
    command
        .assert()
        .failure()
        .stderr(contains("escapes the bundle root"));
}

#[rstest]
fn run_reports_missing_executables(bundle_root: TempDir) {
    let mut command = cargo_bin_cmd!("hookwire");
    command.args(["run", "--root", &root_arg(&bundle_root)]);
    command.args(["--id", "demo", "--executable", "backend.exe"]);
    command
        .assert()
        .failure()
        .stderr(contains("failed to launch plugin 'demo'"));
}

#[rstest]
fn run_rejects_unreadable_configuration(bundle_root: TempDir) {
    let mut command = cargo_bin_cmd!("hookwire");
    command.args(["run", "--root", &root_arg(&bundle_root)]);
    command.args(["--id", "demo", "--executable", "backend.exe"]);
    command.args(["--config", "/nonexistent/hookwire.json"]);
    command
        .assert()
        .failure()
        .stderr(contains("failed to read plugin configuration"));
}

#[rstest]
fn unknown_log_format_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("hookwire");
    command.args(["--log-format", "yaml", "check"]);
    command.args(["--root", "/tmp", "--id", "demo", "--executable", "x"]);
    command.assert().failure().stderr(contains("--log-format"));
}
