use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn tagcsv() -> Command {
    let mut cmd = Command::cargo_bin("tagcsv").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("TAGCSV_TOOL");
    cmd
}

#[test]
fn help_lists_window_options() {
    tagcsv()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--start"))
        .stdout(predicate::str::contains("--source-format"));
}

#[test]
fn generate_config_writes_sample() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tagcsv.toml");

    tagcsv()
        .arg("--generate-config")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated sample configuration file"));

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[pool]"));
    assert!(content.contains("[capture]"));
}

#[test]
fn reversed_window_exits_with_validation_code() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("line1.dt"), "raw").unwrap();

    tagcsv()
        .arg(temp_dir.path())
        .args(["--start", "2024-03-01 12:00:00"])
        .args(["--end", "2024-03-01 10:00:00"])
        .args(["--output-format", "plain", "-q"])
        .assert()
        .code(3);

    assert!(!temp_dir.path().join("MergedDataFrame.csv").exists());
}

#[test]
fn malformed_timestamp_is_rejected_by_parser() {
    tagcsv()
        .arg(".")
        .args(["--start", "yesterday"])
        .args(["--end", "2024-03-01 10:00:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--start"));
}

#[test]
fn dry_run_prints_commands_without_running_them() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("line1.dt"), "raw").unwrap();

    tagcsv()
        .arg(temp_dir.path())
        .args(["--start", "2024-03-01 10:00:00"])
        .args(["--end", "2024-03-01 12:00:00"])
        .args(["--tags", "FLOW", "--tool", "/no/such/drtu", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/no/such/drtu"))
        .stdout(predicate::str::contains("-match=(FLOW)"))
        .stdout(predicate::str::contains("-TBEGIN=24/03/01 10:00:00"));

    assert!(!temp_dir.path().join("line1.rtu").exists());
}
