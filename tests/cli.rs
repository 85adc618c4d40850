//! CLI integration tests for linkforge commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use linkforge::auth::SecretHasher;
use linkforge::store::{SqliteStore, Store};
use predicates::prelude::*;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("linkforge").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("LINKFORGE_DATA_DIR");
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(["init", "--data-dir", &self.data_dir_str()])
            .assert()
    }

    fn create_user(&self, username: &str, email: &str, password: &str) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "user",
                "create",
                "--data-dir",
                &self.data_dir_str(),
                "--username",
                username,
                "--email",
                email,
                "--password",
                password,
            ])
            .assert()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::new(self.data_dir().join("linkforge.db")).expect("failed to open store")
    }
}

#[test]
fn test_help_lists_commands() {
    let ctx = TestContext::new();
    ctx.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("user"));
}

#[test]
fn test_init_creates_database() {
    let ctx = TestContext::new();
    ctx.init()
        .success()
        .stdout(predicate::str::contains("Created database"));

    assert!(ctx.data_dir().join("linkforge.db").exists());
}

#[test]
fn test_init_is_idempotent() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.init()
        .success()
        .stdout(predicate::str::contains("already initialized"));
}

#[test]
fn test_user_create() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.create_user("alice", "alice@example.com", "hunter22")
        .success()
        .stdout(predicate::str::contains("Created user 'alice'"));

    let user = ctx
        .store()
        .get_user_by_username("alice")
        .expect("lookup failed")
        .expect("user missing");
    assert_eq!(user.email, "alice@example.com");
    assert!(
        SecretHasher::new()
            .verify("hunter22", &user.password_hash)
            .expect("verify failed")
    );
}

#[test]
fn test_user_create_rejects_duplicates() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.create_user("alice", "alice@example.com", "hunter22").success();

    ctx.create_user("alice", "other@example.com", "hunter22")
        .failure()
        .stderr(predicate::str::contains("already registered"));
}

#[test]
fn test_user_create_validates_input() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.create_user("login", "a@example.com", "hunter22")
        .failure()
        .stderr(predicate::str::contains("reserved"));
    ctx.create_user("bob", "a@example.com", "short")
        .failure()
        .stderr(predicate::str::contains("at least 6"));
}

#[test]
fn test_user_create_requires_init() {
    let ctx = TestContext::new();
    ctx.create_user("alice", "alice@example.com", "hunter22")
        .failure()
        .stderr(predicate::str::contains("linkforge init"));
}

#[test]
fn test_reset_password() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.create_user("alice", "alice@example.com", "hunter22").success();

    ctx.cmd()
        .args([
            "user",
            "reset-password",
            "--data-dir",
            &ctx.data_dir_str(),
            "--username",
            "alice",
            "--password",
            "new-secret",
        ])
        .assert()
        .success();

    let user = ctx
        .store()
        .get_user_by_username("alice")
        .expect("lookup failed")
        .expect("user missing");
    let hasher = SecretHasher::new();
    assert!(hasher.verify("new-secret", &user.password_hash).expect("verify failed"));
    assert!(!hasher.verify("hunter22", &user.password_hash).expect("verify failed"));
}

#[test]
fn test_serve_rejects_bad_config() {
    let ctx = TestContext::new();
    let config_path = ctx.data_dir().join("linkforge.toml");
    std::fs::write(&config_path, "[links]\ncode_length = 0\n").expect("write config");

    ctx.cmd()
        .args([
            "serve",
            "--config",
            &config_path.to_string_lossy(),
            "--data-dir",
            &ctx.data_dir_str(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("code_length"));
}
