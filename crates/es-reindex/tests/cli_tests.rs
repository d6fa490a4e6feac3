//! CLI tests for the `es-reindex` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the CLI binary command
#[allow(deprecated)]
fn reindex_cmd() -> Command {
    let mut cmd = Command::cargo_bin("es-reindex").unwrap();
    for var in [
        "ES_USERNAME",
        "ES_PASSWORD",
        "ES_API_KEY",
        "ES_TARGET_USERNAME",
        "ES_TARGET_PASSWORD",
        "ES_TARGET_API_KEY",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_displays_usage() {
    reindex_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--target-routing"))
        .stdout(predicate::str::contains("--only-metadata"));
}

#[test]
fn test_version_displays_version() {
    reindex_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("es-reindex"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    reindex_cmd()
        .arg("--no-such-flag")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_indices_is_config_error() {
    reindex_cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("REINDEX-001"));
}

#[test]
fn test_zero_chunk_size_is_config_error() {
    reindex_cmd()
        .args(["-s", "products", "-t", "products-v2", "--chunk-size", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("chunk size"));
}

#[test]
fn test_bad_keep_alive_is_config_error() {
    reindex_cmd()
        .args(["-s", "a", "-t", "b", "--scroll-keep-alive", "five minutes"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();

    reindex_cmd()
        .arg("--config")
        .arg(temp_dir.path().join("absent.yaml"))
        .assert()
        .code(2);
}

#[test]
fn test_config_file_values_are_validated() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reindex.yaml");
    fs::write(
        &path,
        "source_index: products\ntarget_index: products\noptions:\n  chunk_size: 100\n",
    )
    .unwrap();

    // Same index on the same cluster
    reindex_cmd()
        .arg("--config")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("same index"));
}

#[test]
fn test_unreachable_cluster_is_transport_error() {
    reindex_cmd()
        .args([
            "-s",
            "products",
            "-t",
            "products-v2",
            "--source-host",
            "127.0.0.1",
            "--source-port",
            "1",
            "--target-host",
            "127.0.0.1",
            "--target-port",
            "1",
            "--max-retries",
            "0",
            "--timeout",
            "5",
        ])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("REINDEX-007"));
}
