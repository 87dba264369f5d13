use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn refbroker() -> Command {
    let mut cmd = Command::cargo_bin("refbroker").expect("binary");
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn run_json(args: &[&str], path: &Path) -> Value {
    let output = refbroker()
        .arg("process")
        .arg(path)
        .args(args)
        .output()
        .expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn setup_project() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src/Model")).unwrap();
    fs::write(
        root.join("src/Model/User.php"),
        r#"<?php
namespace App\Model;

/** A registered user */
final class User extends Base implements \JsonSerializable
{
    public function jsonSerialize(): mixed { return []; }
}
"#,
    )
    .unwrap();
    fs::write(
        root.join("src/helpers.php"),
        r#"<?php
namespace App;

const VERSION = '1.0';

function version(): string
{
    return VERSION;
}
"#,
    )
    .unwrap();
    temp
}

#[test]
fn process_directory_reports_units_and_listings() {
    let temp = setup_project();
    let body = run_json(
        &["--classes", "--functions", "--constants"],
        &temp.path().join("src"),
    );

    assert_eq!(body["units"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["classes"][0]["name"], "App\\Model\\User");
    assert_eq!(body["classes"][0]["flavor"], "class");
    assert_eq!(body["classes"][0]["parents"][0], "App\\Model\\Base");
    assert_eq!(body["functions"][0]["name"], "App\\version");
    assert_eq!(body["constants"][0]["name"], "App\\VERSION");
    assert_eq!(body["stats"]["units_tokenized"], 2);
}

#[test]
fn lookups_report_hits_and_misses() {
    let temp = setup_project();
    let body = run_json(
        &[
            "--lookup-class",
            "\\App\\Model\\User",
            "--lookup-class",
            "App\\Missing",
            "--lookup-function",
            "App\\version",
        ],
        &temp.path().join("src"),
    );

    let lookups = body["lookups"].as_array().expect("lookups");
    assert_eq!(lookups.len(), 3);
    assert_eq!(lookups[0]["found"]["name"], "App\\Model\\User");
    assert_eq!(lookups[0]["found"]["tokenized"], true);
    assert!(lookups[1]["found"].is_null());
    assert_eq!(lookups[2]["kind"], "function");
    assert!(body.get("classes").is_none());
}

#[test]
fn internal_classes_appear_with_all_classes() {
    let temp = setup_project();
    let body = run_json(
        &["--all-classes", "--internal-class", "JsonSerializable"],
        &temp.path().join("src"),
    );

    let names: Vec<&str> = body["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .filter_map(|class| class["name"].as_str())
        .collect();
    assert_eq!(names, vec!["App\\Model\\User", "JsonSerializable"]);
    assert_eq!(body["classes"][1]["origin"], "internal");
}

#[test]
fn config_file_is_applied() {
    let temp = setup_project();
    let config = temp.path().join("refbroker.toml");
    fs::write(&config, "retain_token_streams = false\nmax_tokenized_units = 1\n").unwrap();

    let body = run_json(
        &["--config", config.to_str().unwrap(), "--classes"],
        &temp.path().join("src"),
    );
    assert_eq!(body["classes"][0]["tokenized"], false);
}

#[test]
fn invalid_config_is_rejected() {
    let temp = setup_project();
    let config = temp.path().join("bad.toml");
    fs::write(&config, "max_tokenized_units = 0\n").unwrap();

    refbroker()
        .arg("process")
        .arg(temp.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_tokenized_units must be > 0"));
}

#[test]
fn missing_target_fails_with_kind() {
    let temp = tempdir().unwrap();
    refbroker()
        .arg("process")
        .arg(temp.path().join("absent.php"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("TargetNotFound"));
}

#[test]
fn broken_file_reports_processing_failure() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("bad.php"), "<?php\nfunction broken() {\n").unwrap();

    refbroker()
        .arg("process")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ProcessingFailed"))
        .stderr(predicate::str::contains("bad.php"));
}

#[test]
fn real_path_prints_canonical_path() {
    let temp = setup_project();
    let expected = fs::canonicalize(temp.path().join("src/helpers.php")).unwrap();

    refbroker()
        .arg("real-path")
        .arg(temp.path().join("src/../src/helpers.php"))
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().as_ref()));

    refbroker()
        .arg("real-path")
        .arg(temp.path().join("nope.php"))
        .assert()
        .failure();
}
