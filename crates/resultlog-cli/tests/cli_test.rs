use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use resultlog::{ContentMask, LogFormat, Mode, ResultStore, SampleResult};
use tempfile::TempDir;

fn write_log(path: &Path, format: LogFormat, mask: ContentMask) {
    let mut store = ResultStore::with_format(path, format);
    store.open_source(Mode::Overwrite, mask).unwrap();
    for i in 0..12u64 {
        let label = if i % 2 == 0 { "home" } else { "search, full" };
        store
            .record_sample(
                &SampleResult::new(label, 100 + i, i != 3)
                    .with_sub_result(SampleResult::new("asset", 2, true)),
            )
            .unwrap();
    }
    store.close_source().unwrap();
}

fn rlog() -> Command {
    Command::cargo_bin("rlog").unwrap()
}

#[test]
fn test_inspect_prints_summary() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("run.jsonl");
    write_log(&log, LogFormat::JsonLines, ContentMask::ALL);

    rlog()
        .arg("inspect")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("Records: 12"))
        .stdout(predicate::str::contains("home"))
        .stdout(predicate::str::contains("TOTAL"));
}

#[test]
fn test_dump_respects_limit() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("run.yaml");
    write_log(&log, LogFormat::Yaml, ContentMask::ALL);

    let output = rlog()
        .args(["dump", "--chunk", "4", "--limit", "5"])
        .arg(&log)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 5);
    assert!(stdout.lines().all(|l| l.starts_with('{')));
}

#[test]
fn test_csv_mask_comes_from_header() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("run.csv");
    let mask = ContentMask::BASE_INFO | ContentMask::SUB_RESULTS;
    write_log(&log, LogFormat::Csv, mask);

    rlog()
        .arg("inspect")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("Records: 12"))
        .stdout(predicate::str::contains(format!("Mask: {mask}")));

    rlog()
        .args(["--mask", "base_info", "inspect"])
        .arg(&log)
        .assert()
        .success();

    rlog()
        .args(["--mask", "all", "inspect"])
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot open with mask"));
}

#[test]
fn test_dump_rejects_zero_chunk() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("run.jsonl");
    write_log(&log, LogFormat::JsonLines, ContentMask::ALL);

    rlog()
        .args(["dump", "--chunk", "0"])
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--chunk"));
}

#[test]
fn test_export_csv_to_file() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("run.jsonl");
    let out = tmp.path().join("flat.csv");
    write_log(&log, LogFormat::JsonLines, ContentMask::ALL);

    rlog()
        .args(["export", "--to", "csv", "-o"])
        .arg(&out)
        .arg(&log)
        .assert()
        .success();

    let content = std::fs::read_to_string(&out).unwrap();
    assert_eq!(content.lines().count(), 13);
    assert!(content.contains("\"search, full\""));
}

#[test]
fn test_export_parquet_requires_output() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("run.jsonl");
    write_log(&log, LogFormat::JsonLines, ContentMask::ALL);

    rlog()
        .args(["export", "--to", "parquet"])
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--output"));
}

#[test]
fn test_convert_narrows_mask() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("run.jsonl");
    let dst = tmp.path().join("run.csv");
    write_log(&src, LogFormat::JsonLines, ContentMask::ALL);

    rlog()
        .args(["convert", "--to-mask", "base_info"])
        .arg(&src)
        .arg(&dst)
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted 12 records"));

    let mut store = ResultStore::with_format(&dst, LogFormat::Csv);
    store.open_source(Mode::Append, ContentMask::BASE_INFO).unwrap();
    let samples = store.load_log().unwrap();
    assert_eq!(samples.len(), 12);
    assert!(samples.iter().all(|s| s.sub_results.is_empty()));
    assert_eq!(samples[1].label(), Some("search, full"));
}

#[test]
fn test_missing_log_fails() {
    rlog()
        .args(["inspect", "does-not-exist.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Log not found"));
}
