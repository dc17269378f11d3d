//! Smoke tests for the binary's argument handling.

use std::io::Write;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;

fn hangar() -> Command {
    let mut cmd = cargo_bin_cmd!("hangar");
    cmd.env_remove("HANGAR_COMPUTE_URL")
        .env_remove("HANGAR_AUTH_TOKEN")
        .env_remove("HANGAR_SERVER_URL")
        .env_remove("HANGAR_PROFILE");
    cmd
}

#[test]
fn help_lists_the_subcommands() {
    let assert = hangar().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(output.contains("run"));
    assert!(output.contains("tick"));
    assert!(output.contains("check"));
}

#[test]
fn a_missing_subcommand_is_an_error() {
    hangar().assert().failure();
}

#[test]
fn check_fails_without_required_configuration() {
    let mut profile = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(profile, "{{}}").expect("write profile");

    hangar()
        .args(["check", "--profile"])
        .arg(profile.path())
        .assert()
        .failure();
}

#[test]
fn check_accepts_a_complete_environment_and_profile() {
    let mut profile = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(profile, r#"{{"vm_prefix": "hangar-"}}"#).expect("write profile");

    hangar()
        .env("HANGAR_COMPUTE_URL", "https://compute.example.net/v2.1")
        .env("HANGAR_AUTH_TOKEN", "token")
        .env("HANGAR_SERVER_URL", "https://cp.example.net")
        .args(["check", "--profile"])
        .arg(profile.path())
        .assert()
        .success();
}
