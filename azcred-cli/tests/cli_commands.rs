//! Integration tests for the azcred commands
//!
//! These tests run the built binary against a temporary configuration with
//! constant and empty credentials, so no identity endpoint is needed.

use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

const CONFIG: &str = r#"
credential = "app"

[credentials.app]
driver = "constant"
access_token = "app-token"

[credentials.broken]
driver = "empty"
"#;

/// Helper to write a configuration file into a temporary directory.
fn test_config() -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("credentials.toml");
    std::fs::write(&path, CONFIG).unwrap();
    (path, temp_dir)
}

fn azcred(config: &PathBuf, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_azcred"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_token_prints_access_token() {
    let (config, _temp) = test_config();

    let output = azcred(&config, &["token", "https://vault.azure.net/.default"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "app-token");
}

#[test]
fn test_token_json_output() {
    let (config, _temp) = test_config();

    let output = azcred(
        &config,
        &["token", "https://vault.azure.net/.default", "--no-cache", "--json"],
    );

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["access_token"], "app-token");
}

#[test]
fn test_failing_credential_exits_with_error() {
    let (config, _temp) = test_config();

    let output = azcred(
        &config,
        &["token", "https://vault.azure.net/.default", "-c", "broken"],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Empty Credential Driver"));
}

#[test]
fn test_unknown_credential_exits_with_error() {
    let (config, _temp) = test_config();

    let output = azcred(&config, &["driver", "-c", "missing"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing"));
}

#[test]
fn test_driver_command() {
    let (config, _temp) = test_config();

    let output = azcred(&config, &["driver"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "constant");

    let output = azcred(&config, &["driver", "--credential", "broken"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "empty");
}

#[test]
fn test_forget_command() {
    let (config, _temp) = test_config();

    let output = azcred(&config, &["forget", "https://vault.azure.net/.default"]);
    assert!(output.status.success());
}
