use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_cli(args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_mdcompare_cli");
    let config_dir = TempDir::new().expect("config dir");
    Command::new(exe)
        .args(args)
        .env("XDG_CONFIG_HOME", config_dir.path())
        .env("APPDATA", config_dir.path())
        .env("HOME", config_dir.path())
        .env_remove("MDCOMPARE_SOURCE_TOKEN")
        .env_remove("MDCOMPARE_TARGET_TOKEN")
        .output()
        .expect("failed to run mdcompare_cli")
}

fn run_cli_json(args: &[&str]) -> Value {
    let output = run_cli(args);
    assert!(
        output.status.success(),
        "command failed: {}\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout not utf-8");
    serde_json::from_str(&stdout).expect("invalid json output")
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).expect("write json");
}

fn names(report: &Value, bucket: &str) -> Vec<String> {
    report["result"][bucket]
        .as_array()
        .unwrap_or_else(|| panic!("{bucket} array missing"))
        .iter()
        .map(|entry| entry["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn write_class_dumps(dir: &Path) -> (String, String) {
    let source = dir.join("source.json");
    let target = dir.join("target.json");
    write_json(
        &source,
        &json!([
            { "Body": "a\nb", "Id": "s1", "Name": "Edited" },
            { "Body": "same", "Id": "s2", "Name": "Same" },
            { "Body": "new", "Id": "s3", "Name": "SourceOnly" },
        ]),
    );
    write_json(
        &target,
        &json!([
            { "Body": "same", "Id": "t1", "Name": "Same" },
            { "Body": "a\nc", "Id": "t2", "Name": "Edited" },
            { "Body": "old", "Id": "t3", "Name": "TargetOnly" },
        ]),
    );
    (
        source.to_string_lossy().into_owned(),
        target.to_string_lossy().into_owned(),
    )
}

#[test]
fn test_diff_json_report() {
    let temp = TempDir::new().unwrap();
    let (source, target) = write_class_dumps(temp.path());

    let report = run_cli_json(&["diff", "--type", "ApexClass", &source, &target, "--json"]);

    assert_eq!(report["source"], json!(source));
    assert_eq!(report["summary"]["total"], json!(4));
    assert_eq!(report["summary"]["changed"], json!(1));
    assert_eq!(names(&report, "unchanged"), vec!["Same"]);
    assert_eq!(names(&report, "added"), vec!["SourceOnly"]);
    assert_eq!(names(&report, "removed"), vec!["TargetOnly"]);

    let changed = &report["result"]["changed"][0];
    assert_eq!(changed["name"], json!("Edited"));
    assert_eq!(changed["id"], json!("s1"));
    assert_eq!(
        changed["differences"],
        json!([{ "line": 2, "source": "b", "target": "c" }])
    );
}

#[test]
fn test_diff_only_drops_unchanged() {
    let temp = TempDir::new().unwrap();
    let (source, target) = write_class_dumps(temp.path());

    let report = run_cli_json(&["diff", "-t", "ApexClass", &source, &target, "--json", "-d"]);

    assert_eq!(report["summary"]["unchanged"], json!(1));
    assert!(names(&report, "unchanged").is_empty());
    assert_eq!(names(&report, "changed"), vec!["Edited"]);
}

#[test]
fn test_diff_aligned_algorithm() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source.json");
    let target = temp.path().join("target.json");
    write_json(&source, &json!([{ "Body": "a\nb", "Name": "Svc" }]));
    write_json(&target, &json!([{ "Body": "header\na\nb", "Name": "Svc" }]));
    let source = source.to_string_lossy().into_owned();
    let target = target.to_string_lossy().into_owned();

    let positional = run_cli_json(&["diff", "-t", "ApexClass", &source, &target, "--json"]);
    assert_eq!(
        positional["result"]["changed"][0]["differences"]
            .as_array()
            .map(Vec::len),
        Some(3)
    );

    let aligned = run_cli_json(&[
        "diff", "-t", "ApexClass", &source, &target, "--json", "--algorithm", "aligned",
    ]);
    assert_eq!(
        aligned["result"]["changed"][0]["differences"],
        json!([{ "line": 1, "source": "(empty)", "target": "header" }])
    );
}

#[test]
fn test_diff_text_output() {
    let temp = TempDir::new().unwrap();
    let (source, target) = write_class_dumps(temp.path());

    let output = run_cli(&["diff", "-t", "ApexClass", &source, &target, "--no-color"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ApexClass/Edited"));
    assert!(stdout.contains("ApexClass/TargetOnly"));
    assert!(stdout.contains("Changed:         1"));
    assert!(!stdout.contains("\x1b["));
}

#[test]
fn test_diff_rejects_non_array_dump() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source.json");
    let target = temp.path().join("target.json");
    write_json(&source, &json!({ "Name": "NotAnArray" }));
    write_json(&target, &json!([]));

    let output = run_cli(&[
        "diff",
        "-t",
        "ApexClass",
        &source.to_string_lossy(),
        &target.to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("must contain a JSON array"));
}

#[test]
fn test_types_uses_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("mdcompare.toml");
    fs::write(&config, "metadata_types = [\"ApexClass\", \"Layout\"]\n").unwrap();

    let output = run_cli(&["--config", &config.to_string_lossy(), "types"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ApexClass\nLayout\n");
}

#[test]
fn test_compare_unknown_profile_fails() {
    let output = run_cli(&[
        "compare",
        "--source",
        "prod",
        "--target",
        "https://dev.example.com",
        "--target-token",
        "tok",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown org profile: prod"));
}

#[test]
fn test_init_writes_default_config_once() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("mdcompare.toml");
    let config_arg = config.to_string_lossy().into_owned();

    let output = run_cli(&["--config", &config_arg, "init"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Wrote default configuration"));

    let written = fs::read_to_string(&config).unwrap();
    assert!(written.contains("api_version = \"v57.0\""));
    assert!(written.contains("batch_size = 25"));

    let output = run_cli(&["--config", &config_arg, "init"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("already exists"));
}
