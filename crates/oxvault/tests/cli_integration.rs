#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn oxvault(vault: &Path) -> Command {
    let mut cmd = Command::cargo_bin("oxvault").unwrap();
    cmd.env_remove("OXVAULT_MASTER_KEY")
        .env_remove("OXVAULT_KEY_FILE")
        .env_remove("OXVAULT_AUDIT_READS")
        .env("OXVAULT_DIR", vault);
    cmd
}

/// Create a temporary vault and return the TempDir (keeps it alive) and the vault path
fn create_temp_vault() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let vault = temp_dir.path().join("vault");
    oxvault(&vault).arg("init").assert().success();
    (temp_dir, vault)
}

#[test]
fn test_init_creates_layout() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path().join("vault");

    oxvault(&vault)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created new vault"))
        .stdout(predicate::str::contains("Key fingerprint"));

    assert!(vault.join("secrets.json").exists());
    assert!(vault.join("master.key").exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(vault.join("master.key")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // Second init refuses to clobber
    oxvault(&vault)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_commands_without_vault_fail() {
    let temp_dir = TempDir::new().unwrap();
    oxvault(&temp_dir.path().join("missing"))
        .args(["get", "API_KEY"])
        .assert()
        .failure();
}

#[test]
fn test_set_get_versions() {
    let (_temp, vault) = create_temp_vault();

    oxvault(&vault)
        .args(["set", "API_KEY", "abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 1"));
    oxvault(&vault)
        .args(["set", "API_KEY", "def456", "--meta", "owner=ops"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 2"));

    oxvault(&vault)
        .args(["get", "API_KEY"])
        .assert()
        .success()
        .stdout("def456\n");
    oxvault(&vault)
        .args(["get", "API_KEY", "--version", "1", "-n"])
        .assert()
        .success()
        .stdout("abc123");

    oxvault(&vault)
        .args(["versions", "API_KEY", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": 2"))
        .stdout(predicate::str::contains("\"owner\": \"ops\""));
}

#[test]
fn test_set_reads_stdin() {
    let (_temp, vault) = create_temp_vault();

    oxvault(&vault)
        .args(["set", "DB_PASS"])
        .write_stdin("from-stdin\n")
        .assert()
        .success();
    oxvault(&vault)
        .args(["get", "DB_PASS"])
        .assert()
        .success()
        .stdout("from-stdin\n");
}

#[test]
fn test_plaintext_never_on_disk() {
    let (_temp, vault) = create_temp_vault();
    oxvault(&vault)
        .args(["set", "TOKEN", "very-distinctive-plaintext"])
        .assert()
        .success();

    let stored = fs::read_to_string(vault.join("secrets.json")).unwrap();
    assert!(stored.contains("TOKEN"));
    assert!(!stored.contains("very-distinctive-plaintext"));
    let audit = fs::read_to_string(vault.join("audit.log")).unwrap();
    assert!(!audit.contains("very-distinctive-plaintext"));
}

#[test]
fn test_delete_and_not_found_exit_codes() {
    let (_temp, vault) = create_temp_vault();
    oxvault(&vault).args(["set", "A", "v1"]).assert().success();

    oxvault(&vault)
        .args(["delete", "A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted A"));

    // NOT_FOUND
    oxvault(&vault).args(["get", "A"]).assert().code(7);
    oxvault(&vault).args(["delete", "A"]).assert().code(7);
    oxvault(&vault)
        .args(["get", "A", "--version", "9"])
        .assert()
        .code(7);

    // History survives the delete
    oxvault(&vault)
        .args(["get", "A", "--version", "1"])
        .assert()
        .success()
        .stdout("v1\n");

    // Re-creating continues the numbering
    oxvault(&vault)
        .args(["set", "A", "v2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 2"));
}

#[test]
fn test_list() {
    let (_temp, vault) = create_temp_vault();
    oxvault(&vault)
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No secrets stored"));

    oxvault(&vault).args(["set", "B", "x"]).assert().success();
    oxvault(&vault).args(["set", "A", "x"]).assert().success();
    oxvault(&vault).args(["set", "C", "x"]).assert().success();
    oxvault(&vault).args(["delete", "C"]).assert().success();

    oxvault(&vault)
        .args(["list", "-1"])
        .assert()
        .success()
        .stdout("B\nA\n");
    oxvault(&vault)
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"B\""));
}

#[test]
fn test_rotate_replaces_key_file_and_keeps_values() {
    let (_temp, vault) = create_temp_vault();
    oxvault(&vault).args(["set", "A", "one"]).assert().success();
    oxvault(&vault).args(["set", "A", "two"]).assert().success();
    let old_key = fs::read_to_string(vault.join("master.key")).unwrap();

    oxvault(&vault)
        .arg("rotate")
        .assert()
        .success()
        .stderr(predicate::str::contains("Rotated master key"));

    let new_key = fs::read_to_string(vault.join("master.key")).unwrap();
    assert_ne!(old_key, new_key);
    assert!(!vault.join("master.key.pending").exists());

    oxvault(&vault)
        .args(["get", "A", "--version", "1"])
        .assert()
        .success()
        .stdout("one\n");
    oxvault(&vault).arg("verify").assert().success();

    // The old key no longer authenticates: AUTH_FAILED
    let stale = vault.with_file_name("stale.key");
    fs::write(&stale, old_key).unwrap();
    oxvault(&vault)
        .args(["--key-file", stale.to_str().unwrap(), "get", "A"])
        .assert()
        .code(3);
}

#[test]
fn test_env_key_takes_precedence_over_key_file() {
    let (_temp, vault) = create_temp_vault();
    let key = fs::read_to_string(vault.join("master.key")).unwrap();
    oxvault(&vault).args(["set", "A", "v"]).assert().success();
    fs::remove_file(vault.join("master.key")).unwrap();

    oxvault(&vault)
        .env("OXVAULT_MASTER_KEY", key.trim())
        .args(["get", "A"])
        .assert()
        .success()
        .stdout("v\n");

    oxvault(&vault)
        .env("OXVAULT_MASTER_KEY", "not base64!")
        .args(["get", "A"])
        .assert()
        .code(3);
}

#[test]
fn test_audit_trail() {
    let (_temp, vault) = create_temp_vault();
    oxvault(&vault).args(["set", "A", "1"]).assert().success();
    oxvault(&vault).args(["set", "B", "1"]).assert().success();
    oxvault(&vault).args(["--audit-reads", "get", "A"]).assert().success();
    oxvault(&vault).args(["delete", "B"]).assert().success();
    oxvault(&vault).arg("rotate").assert().success();

    oxvault(&vault)
        .args(["audit", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operation\": \"rotate\""))
        .stdout(predicate::str::contains("\"operation\": \"get\""));

    oxvault(&vault)
        .args(["audit", "--name", "B", "--operation", "delete"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("set").not());

    let export = vault.with_file_name("export.json");
    oxvault(&vault)
        .args(["audit", "--export", export.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 5 entries"));
    let exported: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
    let sequences: Vec<u64> = exported
        .iter()
        .map(|e| e["sequence"].as_u64().unwrap())
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

    // The JSON-lines sink saw the same entries
    let lines = fs::read_to_string(vault.join("audit.log")).unwrap();
    assert_eq!(lines.lines().count(), 5);
}

#[test]
fn test_corrupt_snapshot_is_vault_invalid() {
    let (_temp, vault) = create_temp_vault();
    fs::write(vault.join("secrets.json"), "{ not json").unwrap();

    oxvault(&vault).arg("list").assert().code(4);
}

#[test]
fn test_rotate_to_supplied_key() {
    let (_temp, vault) = create_temp_vault();
    oxvault(&vault).args(["set", "A", "v"]).assert().success();

    // 32 bytes of 0x07, base64
    let supplied = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=\n";
    let new_key = vault.with_file_name("new.key");
    fs::write(&new_key, supplied).unwrap();

    oxvault(&vault)
        .args(["rotate", "--new-key-file", new_key.to_str().unwrap(), "--print-key"])
        .assert()
        .success()
        .stdout(supplied);
    assert_eq!(fs::read_to_string(vault.join("master.key")).unwrap(), supplied);
    oxvault(&vault).args(["get", "A"]).assert().success().stdout("v\n");
}

#[test]
fn test_init_refuses_to_shadow_env_key() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path().join("vault");
    let env_key = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";

    oxvault(&vault)
        .env("OXVAULT_MASTER_KEY", env_key)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--use-env-key"));
    assert!(!vault.join("master.key").exists());
    assert!(!vault.join("secrets.json").exists());

    oxvault(&vault)
        .env("OXVAULT_MASTER_KEY", env_key)
        .args(["init", "--use-env-key"])
        .assert()
        .success();
    assert!(!vault.join("master.key").exists());

    oxvault(&vault)
        .env("OXVAULT_MASTER_KEY", env_key)
        .args(["set", "A", "v"])
        .assert()
        .success();
    oxvault(&vault)
        .env("OXVAULT_MASTER_KEY", env_key)
        .args(["get", "A"])
        .assert()
        .success()
        .stdout("v\n");
}
