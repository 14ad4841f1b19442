use assert_cmd::Command;
use predicates::prelude::*;

fn write_fixture(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("strings")).unwrap();
    std::fs::write(
        dir.join("strings/app.xml"),
        "<strings>\n  <greeting>Hello</greeting>\n</strings>\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("locsync.toml"),
        r#"
store = "l10n.db"

[[job]]
id = "app"
source_dir = "strings"
ts_dir = "po"
output_dir = "out"
destination_languages = ["fr"]
"#,
    )
    .unwrap();
}

#[test]
fn run_generates_ts_and_output_files() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let mut cmd = Command::cargo_bin("locsync").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("locsync.toml"))
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("[app]"));

    assert!(dir.path().join("po/fr/app.xml.po").exists());
    assert!(dir.path().join("out/fr/app.xml").exists());
    assert!(dir.path().join("l10n.db").exists());
}

#[test]
fn run_emits_json_summaries() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let mut cmd = Command::cargo_bin("locsync").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("locsync.toml"))
        .arg("run")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"job\": \"app\""));
}

#[test]
fn unknown_job_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let mut cmd = Command::cargo_bin("locsync").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("locsync.toml"))
        .arg("run")
        .arg("--job")
        .arg("nope")
        .assert()
        .failure();
}

#[test]
fn skip_hides_a_string_from_ts_emission() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let config = dir.path().join("locsync.toml");

    Command::cargo_bin("locsync")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .assert()
        .success();

    Command::cargo_bin("locsync")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("skip")
        .arg("--string")
        .arg("Hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("set skip flag"));

    Command::cargo_bin("locsync")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg("--force")
        .assert()
        .success();

    let ts = std::fs::read_to_string(dir.path().join("po/fr/app.xml.po")).unwrap();
    assert!(!ts.contains("msgid \"Hello\""));
}

#[test]
fn skip_rejects_unknown_strings() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    Command::cargo_bin("locsync")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("locsync.toml"))
        .arg("skip")
        .arg("--string")
        .arg("Never extracted")
        .assert()
        .failure();
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("locsync").unwrap();
    cmd.current_dir(dir.path()).arg("run").assert().failure();
}
