#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]

use std::path::PathBuf;

use assert_cmd::cargo_bin_cmd;
use predicates::prelude::{PredicateBooleanExt, predicate};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/multimedios")
        .join(name)
}

/// Command with a pinned environment so the host's settings do not leak in.
fn epgscrape() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("epgscrape");
    cmd.env_clear()
        .env("TZ", "America/Monterrey")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_run_from_file_writes_guide() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("guide.xml");

    // Act
    epgscrape()
        .args(["run", "--input"])
        .arg(fixture("programacion.html"))
        .arg("--output")
        .arg(&output)
        .args(["--anchor-date", "2024-08-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run completed"));

    // Assert
    let xml = std::fs::read_to_string(&output).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert_eq!(xml.matches("<programme ").count(), 10);
    assert!(xml.contains(r#"<channel id="multimedios.canal6.monterrey">"#));
}

#[test]
fn test_run_twice_is_byte_identical() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("guide.xml");
    let run = || {
        epgscrape()
            .args(["run", "--input"])
            .arg(fixture("programacion.html"))
            .arg("--output")
            .arg(&output)
            .args(["--anchor-date", "2024-08-01"])
            .assert()
            .success();
        std::fs::read(&output).unwrap()
    };

    // Act
    let first = run();
    let second = run();

    // Assert
    assert_eq!(first, second);
}

#[test]
fn test_run_dry_run_writes_nothing() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("guide.xml");

    // Act
    epgscrape()
        .args(["run", "--dry-run", "--input"])
        .arg(fixture("programacion.html"))
        .arg("--output")
        .arg(&output)
        .args(["--anchor-date", "2024-08-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    // Assert
    assert!(!output.exists());
}

#[test]
fn test_run_page_without_schedule_fails_and_keeps_output() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let page = dir.path().join("page.html");
    std::fs::write(&page, "<html><body><p>Mantenimiento</p></body></html>").unwrap();
    let output = dir.path().join("guide.xml");
    std::fs::write(&output, "previous").unwrap();

    // Act
    epgscrape()
        .args(["run", "--input"])
        .arg(&page)
        .arg("--output")
        .arg(&output)
        .args(["--anchor-date", "2024-08-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pipeline run failed"));

    // Assert
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");
}

#[test]
fn test_run_missing_input_fails() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();

    // Act & Assert
    epgscrape()
        .args(["run", "--input"])
        .arg(dir.path().join("missing.html"))
        .arg("--output")
        .arg(dir.path().join("guide.xml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_run_invalid_timezone_fails() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();

    // Act & Assert
    epgscrape()
        .env("TZ", "Mars/Olympus_Mons")
        .args(["run", "--input"])
        .arg(fixture("programacion.html"))
        .arg("--output")
        .arg(dir.path().join("guide.xml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid timezone"));
}

#[test]
fn test_run_invalid_anchor_date() {
    // Arrange & Act & Assert
    epgscrape()
        .args(["run", "--anchor-date", "01/08/2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--anchor-date"));
}

#[test]
fn test_config_shows_resolved_values() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "channel_name = \"Canal 6\"\n").unwrap();

    // Act & Assert
    epgscrape()
        .env("OUTPUT_FILE", "/srv/epg/guide.xml")
        .arg("config")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("America/Monterrey"))
        .stdout(predicate::str::contains("Canal 6"))
        .stdout(predicate::str::contains("epgscrape-srv_epg_guide.xml.lock"))
        .stdout(predicate::str::contains("/srv/epg/guide.xml.lock").not());
}

#[test]
fn test_config_rejects_invalid_timeout() {
    // Arrange & Act & Assert
    epgscrape()
        .env("TIMEOUT_SECONDS", "soon")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TIMEOUT_SECONDS"));
}

#[test]
fn test_run_help() {
    // Arrange & Act & Assert
    epgscrape()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--anchor-date"))
        .stdout(predicate::str::contains("--dry-run"));
}
