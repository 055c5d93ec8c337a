use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

mod common;

fn difflabel() -> Command {
    Command::cargo_bin("difflabel").unwrap()
}

#[test]
fn runs() {
    difflabel().assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = difflabel();
    cmd.arg("-V");
    cmd.assert().success().stdout("difflabel 0.1.0\n");
}

// Pair subcommand tests

#[test]
fn pair_prints_detection_lines() {
    let temp = tempfile::tempdir().unwrap();
    let bg = temp.path().join("bg.png");
    let sample = temp.path().join("sample.png");
    common::write_scene(&bg, 64, 64, &[]);
    common::write_scene(&sample, 64, 64, &[(10, 10, 20, 20)]);

    let mut cmd = difflabel();
    cmd.arg("pair").arg(&bg).arg(&sample);
    cmd.assert().success().stdout(
        predicate::str::is_match(r"^0 0\.\d{6} 0\.\d{6} 0\.\d{6} 0\.\d{6}\n$").unwrap(),
    );
}

#[test]
fn pair_writes_mask_and_preview() {
    let temp = tempfile::tempdir().unwrap();
    let bg = temp.path().join("bg.png");
    let sample = temp.path().join("sample.png");
    common::write_scene(&bg, 48, 48, &[]);
    common::write_scene(&sample, 48, 48, &[(8, 8, 16, 16)]);

    let mut cmd = difflabel();
    cmd.arg("pair")
        .arg(&bg)
        .arg(&sample)
        .args(["--label", "3", "--output"])
        .arg(temp.path().join("out/sample.txt"))
        .arg("--mask")
        .arg(temp.path().join("out/mask.png"))
        .arg("--preview")
        .arg(temp.path().join("out/preview.png"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 box(es) written"));

    let labels = fs::read_to_string(temp.path().join("out/sample.txt")).unwrap();
    assert!(labels.starts_with("3 "));
    assert!(temp.path().join("out/mask.png").is_file());
    assert!(temp.path().join("out/preview.png").is_file());
}

#[test]
fn pair_with_unreadable_image_fails() {
    let temp = tempfile::tempdir().unwrap();
    common::touch_all(temp.path(), &["bg.png", "sample.png"]);

    let mut cmd = difflabel();
    cmd.arg("pair")
        .arg(temp.path().join("bg.png"))
        .arg(temp.path().join("sample.png"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

// Batch subcommand tests

#[test]
fn batch_writes_label_files() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    common::write_scene(&root.join("bg/hall.png"), 64, 64, &[]);
    common::write_scene(&root.join("samples/hall_1.png"), 64, 64, &[(10, 10, 20, 20)]);
    common::write_scene(&root.join("samples/hall_2.png"), 64, 64, &[]);

    let mut cmd = difflabel();
    cmd.arg("batch")
        .arg("--bg-dir")
        .arg(root.join("bg"))
        .arg("--sample-dir")
        .arg(root.join("samples"))
        .arg("--output-dir")
        .arg(root.join("labels"))
        .args(["--workers", "2", "--no-progress"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2 succeeded, 0 failed"));

    assert_eq!(common::line_count(&root.join("labels/hall_1.txt")), 1);
    assert_eq!(common::line_count(&root.join("labels/hall_2.txt")), 0);
}

#[test]
fn batch_saves_effective_config() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    common::write_scene(&root.join("bg/hall.png"), 16, 16, &[]);
    common::write_scene(&root.join("samples/hall_1.png"), 16, 16, &[]);

    let mut cmd = difflabel();
    cmd.arg("batch")
        .arg("--bg-dir")
        .arg(root.join("bg"))
        .arg("--sample-dir")
        .arg(root.join("samples"))
        .arg("--output-dir")
        .arg(root.join("labels"))
        .args(["--threshold", "45", "--no-progress", "--save-config"])
        .arg(root.join("saved.json"));
    cmd.assert().success();

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("saved.json")).unwrap()).unwrap();
    assert_eq!(saved["diff_threshold"], 45);
    assert_eq!(saved["min_diff_area"], 100);
}

#[test]
fn batch_json_report_lists_failures() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    common::write_scene(&root.join("bg/hall.png"), 16, 16, &[]);
    common::write_scene(&root.join("samples/yard_1.png"), 16, 16, &[]);

    let mut cmd = difflabel();
    cmd.arg("batch")
        .arg("--bg-dir")
        .arg(root.join("bg"))
        .arg("--sample-dir")
        .arg(root.join("samples"))
        .arg("--output-dir")
        .arg(root.join("labels"))
        .args(["--output", "json"]);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("\"failure_count\": 1"))
        .stdout(predicate::str::contains("no matching background for yard_1.png"));
}

#[test]
fn batch_missing_directory_fails() {
    let temp = tempfile::tempdir().unwrap();

    let mut cmd = difflabel();
    cmd.arg("batch")
        .arg("--bg-dir")
        .arg(temp.path().join("nope"))
        .arg("--sample-dir")
        .arg(temp.path())
        .arg("--output-dir")
        .arg(temp.path().join("labels"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn batch_requires_directories() {
    let mut cmd = difflabel();
    cmd.args(["batch", "--no-progress"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--bg-dir is required"));
}

// Verify subcommand tests

fn verify_fixture(root: &std::path::Path) {
    common::touch_all(&root.join("source"), &["a.jpg", "b.jpg", "c.jpg"]);
    common::touch_all(&root.join("target"), &["a_1.png", "a_2.png", "b_1.png"]);
}

fn verify_cmd(root: &std::path::Path) -> Command {
    let mut cmd = difflabel();
    cmd.arg("verify")
        .arg("--source")
        .arg(root.join("source"))
        .arg("--target")
        .arg(root.join("target"))
        .arg("--missing")
        .arg(root.join("missing"))
        .arg("--no-progress");
    cmd
}

#[test]
fn verify_reports_issues_and_fails() {
    let temp = tempfile::tempdir().unwrap();
    verify_fixture(temp.path());

    let mut cmd = verify_cmd(temp.path());
    cmd.args(["--range", "1-2"]);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("  - c.jpg"))
        .stdout(predicate::str::contains("  - b.jpg (missing: 2)"))
        .stdout(predicate::str::contains("Found 2 issue(s)"));

    assert!(temp.path().join("missing/b.jpg").is_file());
    assert!(temp.path().join("missing/c.jpg").is_file());
}

#[test]
fn verify_clean_folder_succeeds() {
    let temp = tempfile::tempdir().unwrap();
    verify_fixture(temp.path());

    let mut cmd = verify_cmd(temp.path());
    cmd.args(["--range", "1-2", "--expected", "1"]);
    // c.jpg has no output at all
    cmd.assert().failure();

    fs::write(temp.path().join("target/c_1.png"), b"").unwrap();
    let mut cmd = verify_cmd(temp.path());
    cmd.args(["--range", "1-2", "--expected", "1"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("All images processed and named correctly."));
}

#[test]
fn verify_json_output_format() {
    let temp = tempfile::tempdir().unwrap();
    verify_fixture(temp.path());

    let mut cmd = verify_cmd(temp.path());
    cmd.args(["--range", "1-2", "--output", "json"]);
    let output = cmd.output().unwrap();
    assert!(!output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["missing"], serde_json::json!(["c.jpg"]));
    assert_eq!(summary["incomplete"][0]["filename"], "b.jpg");
    assert_eq!(summary["expected_count"], 2);
}

#[test]
fn verify_csv_output_format() {
    let temp = tempfile::tempdir().unwrap();
    verify_fixture(temp.path());

    let mut cmd = verify_cmd(temp.path());
    cmd.args(["--range", "1-2", "--output", "csv"]);
    cmd.assert()
        .failure()
        .stdout(predicate::str::starts_with("kind,filename,detail\n"))
        .stdout(predicate::str::contains("missing,c.jpg,"));
}

#[test]
fn verify_custom_requires_pattern() {
    let temp = tempfile::tempdir().unwrap();
    verify_fixture(temp.path());

    let mut cmd = verify_cmd(temp.path());
    cmd.args(["--suffix-type", "custom"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--pattern"));
}

#[test]
fn verify_rejects_bad_range() {
    let mut cmd = difflabel();
    cmd.args(["verify", "--range", "nine"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("expected LOW-HIGH"));
}

#[test]
fn verify_loads_config_section() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    verify_fixture(root);
    fs::write(root.join("target/c_1.png"), b"").unwrap();
    let config = serde_json::json!({
        "first_only": {
            "source_folder": root.join("source"),
            "target_folder": root.join("target"),
            "missing_folder": root.join("missing"),
            "suffix_type": "range",
            "suffix_range": [1, 1]
        }
    });
    fs::write(root.join("verify.json"), config.to_string()).unwrap();

    let mut cmd = difflabel();
    cmd.arg("verify")
        .arg("--config")
        .arg(root.join("verify.json"))
        .args(["--section", "first_only", "--no-progress"]);
    // a_2.png is outside the configured range
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("  - a_2.png"))
        .stdout(predicate::str::contains("Found 1 issue(s)"));
}
