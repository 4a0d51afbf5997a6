//! End-to-end checks of the command-line surface.

use assert_cmd::Command;

fn portcullis() -> Command {
    Command::cargo_bin("portcullis").expect("binary builds")
}

#[test]
fn help_lists_the_three_subcommands() {
    let output = portcullis().arg("--help").output().expect("run --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("watch"));
    assert!(stdout.contains("register"));
    assert!(stdout.contains("status"));
}

#[test]
fn watch_help_documents_both_mode_flags() {
    let output = portcullis()
        .args(["watch", "--help"])
        .output()
        .expect("run watch --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--safe-mode"));
    assert!(stdout.contains("--allow-unregistered"));
}

#[test]
fn status_works_against_an_empty_state_root() {
    let dir = tempfile::tempdir().expect("tempdir");

    let output = portcullis()
        .arg("status")
        .env("PORTCULLIS_HOME", dir.path())
        .output()
        .expect("run status");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Registered images: 0"));
    assert!(stdout.contains("(no events yet)"));
}

#[test]
fn unknown_subcommand_fails() {
    let output = portcullis().arg("frobnicate").output().expect("run");
    assert!(!output.status.success());
}
