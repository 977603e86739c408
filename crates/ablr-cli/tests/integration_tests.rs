//! Integration tests for the ablr CLI
//!
//! These tests run the binary end-to-end against temporary source trees

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Helper function to create a test CLI command
#[allow(deprecated)]
fn cli() -> Command {
    let mut cmd = Command::cargo_bin("ablr").unwrap();
    cmd.arg("--no-color");
    cmd
}

/// Temporary project with a main file, an include and a config file that
/// keeps the rollback directory inside the project
fn create_test_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("main.p"),
        "DISPLAY 1.\n{inc.i &what=2}\nDO:\nDISPLAY 3.\nEND.\n",
    )
    .unwrap();
    fs::write(temp_dir.path().join("inc.i"), "DISPLAY {&what}.\n").unwrap();
    fs::write(
        temp_dir.path().join(".ablrc.json"),
        r#"{
  // kept next to the sources so every test is self-contained
  "opsys": "unix",
  "rollbackDir": "rollback",
}
"#,
    )
    .unwrap();
    temp_dir
}

#[test]
fn test_help_command() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ablr exposes the ABL refactoring core"))
        .stdout(predicate::str::contains("rollback"));
}

#[test]
fn test_version_command() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(VERSION));
}

#[test]
fn test_scan_lists_literal_tokens() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["scan", "main.p"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1:1 ID \"DISPLAY\""))
        .stdout(predicate::str::contains("1:10 PERIOD \".\""))
        .stdout(predicate::str::contains("2:1 LEFTCURLY \"{\""))
        .stdout(predicate::str::contains("1:11 NEWLINE \"\\n\""));
}

#[test]
fn test_scan_missing_file_fails() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["scan", "absent.p"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("absent.p"));
}

#[test]
fn test_expand_text_substitutes_include() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["expand", "main.p", "--text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DISPLAY 1.\nDISPLAY 2.\n"));
}

#[test]
fn test_expand_dumps_tree() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["expand", "main.p"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<ExpansionSet>"))
        .stdout(predicate::str::contains("<Expansion"));
}

#[test]
fn test_expand_lists_includes() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["expand", "main.p", "--includes"])
        .assert()
        .success()
        .stdout(predicate::str::contains(":2:1 -> "))
        .stdout(predicate::str::contains("inc.i"));
}

#[test]
fn test_expand_reports_structural_errors() {
    let project = create_test_project();
    fs::write(project.path().join("broken.p"), "&ENDIF\n").unwrap();
    cli()
        .current_dir(project.path())
        .args(["expand", "broken.p"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unexpected &ENDIF"));
}

#[test]
fn test_indent_changes_and_rollback() {
    let project = create_test_project();
    let main = project.path().join("main.p");
    let original = fs::read_to_string(&main).unwrap();

    cli()
        .current_dir(project.path())
        .args(["indent", "main.p", "--from", "4", "--to", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MODIFIED"));
    assert_eq!(
        fs::read_to_string(&main).unwrap(),
        "DISPLAY 1.\n{inc.i &what=2}\nDO:\n  DISPLAY 3.\nEND.\n"
    );

    cli()
        .current_dir(project.path())
        .args(["changes", "--diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MODIFIED"))
        .stdout(predicate::str::contains("+  DISPLAY 3."));

    cli()
        .current_dir(project.path())
        .arg("rollback")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled back 1 file(s)"));
    assert_eq!(fs::read_to_string(&main).unwrap(), original);

    cli()
        .current_dir(project.path())
        .arg("changes")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes recorded"));
}

#[test]
fn test_indent_rejects_bad_range() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["indent", "main.p", "--from", "5", "--to", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid line range"));
}

#[test]
fn test_rollback_without_transaction() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .arg("rollback")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to roll back"));
}

#[test]
fn test_config_show_reads_discovered_file() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rollbackDir\": \"rollback\""))
        .stdout(predicate::str::contains("\"opsys\": \"unix\""));
}

#[test]
fn test_config_schema() {
    cli()
        .args(["config", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("propath"))
        .stdout(predicate::str::contains("maxIncludeDepth"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let project = create_test_project();
    cli()
        .current_dir(project.path())
        .args(["--config", "nope.toml", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
