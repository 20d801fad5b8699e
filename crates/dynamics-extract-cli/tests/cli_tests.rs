//! CLI integration tests for dynamics-extract.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any network access.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the dynamics-extract binary.
fn cmd() -> Command {
    Command::cargo_bin("dynamics-extract").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("discover"))
        .stdout(predicate::str::contains("sync"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dynamics-extract"));
}

#[test]
fn test_discover_command_exists() {
    cmd()
        .args(["discover", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog"));
}

#[test]
fn test_sync_command_exists() {
    cmd()
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state messages"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_state_file_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--state-file"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    // -c should work as short for --config
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests - Generic Failures (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "sync"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "discover"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Valid YAML but no credentials
    writeln!(file, "domain: contoso").unwrap();
    writeln!(file, "start_date: \"2023-01-01T00:00:00Z\"").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("client_id"));
}

#[test]
fn test_zero_window_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"domain: contoso
client_id: app-id
client_secret: shh
redirect_uri: https://localhost/callback
refresh_token: refresh
start_date: "2023-01-01T00:00:00Z"
sync:
  window_days: 0
"#
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("window_days"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
