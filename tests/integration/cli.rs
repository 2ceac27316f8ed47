//! The `hothost` binary: configuration layering, read-only commands and error rendering.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `hothost` command running in `dir` with no inherited `HOT_*` variables.
fn hothost(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hothost").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    for (name, _) in std::env::vars() {
        if name.starts_with("HOT_") {
            cmd.env_remove(name);
        }
    }
    cmd
}

#[test]
fn test_version_defaults() {
    let dir = TempDir::new().unwrap();
    hothost(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("hothost\t"))
        .stdout(predicate::str::contains(format!("hothost\t{}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_configuration_layers() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("appsettings.toml"), "AppName = \"FromFile\"\n").unwrap();

    hothost(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FromFile\t"));

    hothost(&dir)
        .env("HOT_APPNAME", "FromEnv")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FromEnv\t"));

    hothost(&dir)
        .env("HOT_APPNAME", "FromEnv")
        .args(["--set", "AppName=FromFlag", "version"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FromFlag\t"));
}

#[test]
fn test_environment_specific_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("appsettings.toml"), "AppName = \"Base\"\n").unwrap();
    std::fs::write(
        dir.path().join("appsettings.Staging.toml"),
        "AppName = \"Staged\"\n",
    )
    .unwrap();

    hothost(&dir)
        .args(["--set", "Environment=Staging", "version"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Staged\t"));
}

#[test]
fn test_helpconfig_lists_sources_and_keys() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("appsettings.toml"),
        "[Update]\nSecret = \"do-not-print\"\n",
    )
    .unwrap();

    hothost(&dir)
        .arg("helpconfig")
        .assert()
        .success()
        .stdout(predicate::str::contains("appsettings.toml (loaded)"))
        .stdout(predicate::str::contains("Update:AcceptFrom"))
        .stdout(predicate::str::contains("HOT_"))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("do-not-print").not());
}

#[test]
fn test_infos_report() {
    let dir = TempDir::new().unwrap();
    hothost(&dir)
        .args(["--set", "AppName=Billing", "infos"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Application:"))
        .stdout(predicate::str::contains("Billing"))
        .stdout(predicate::str::contains("Deployment mode:"));
}

#[test]
fn test_autoupdate_without_url_fails() {
    let dir = TempDir::new().unwrap();
    hothost(&dir)
        .arg("autoupdate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Update:URL"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    hothost(&dir)
        .args(["--config", "missing.toml", "version"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing.toml"));
}

#[test]
fn test_malformed_override_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    hothost(&dir)
        .args(["--set", "novalue", "version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}
