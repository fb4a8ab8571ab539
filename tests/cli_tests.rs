//! Command-line tests against the built binary.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ASSEMBLY: &str = "AS 2 2

CO ctgA 4 1 1 U
ACGT

BQ
 40 40 40 40

AF ra U 1
BS 1 4 ra

RD ra 4 0 0
ACGT

QA 1 4 1 4
DS CHROMAT_FILE: ra PHD_FILE: ra.phd.1 TIME: Thu Sep 23 10:48:44 2004

CO ctgB 3 1 1 U
GGC

BQ
 30 30 30

AF rb U 1
BS 1 3 rb

RD rb 3 0 0
GGC

QA 1 3 1 3
DS CHROMAT_FILE: rb PHD_FILE: rb.phd.1 TIME: Thu Sep 23 10:48:44 2004

RT{
rb polymorphism consed 1 2 040923:104844
}

CT{
ctgA comment consed 1 2 040923:104844
check this
}
";

fn fixture() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.ace");
    std::fs::write(&path, ASSEMBLY).unwrap();
    (dir, path)
}

fn ace_assembly() -> Command {
    Command::cargo_bin("ace-assembly").unwrap()
}

#[test]
fn test_help() {
    ace_assembly()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("rewrite"));
}

#[test]
fn test_stats_text() {
    let (_dir, input) = fixture();
    ace_assembly()
        .arg("stats")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Contigs: 2"))
        .stdout(predicate::str::contains("Reads:   2"))
        .stdout(predicate::str::contains("ctgB"));
}

#[test]
fn test_stats_json() {
    let (_dir, input) = fixture();
    let output = ace_assembly()
        .args(["stats", "--format", "json", "--store", "streaming"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["num_contigs"], 2);
    assert_eq!(report["tags"]["read"], 1);
    assert_eq!(report["contigs"][0]["id"], "ctgA");
    assert_eq!(report["contigs"][0]["mean_consensus_quality"], 40);
}

#[test]
fn test_stats_tsv_with_contig_filter() {
    let (_dir, input) = fixture();
    ace_assembly()
        .args(["stats", "--format", "tsv", "--contig", "ctgB"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("id\tgapped_length"))
        .stdout(predicate::str::contains("ctgB\t3\t3\t1\tfalse\t30"))
        .stdout(predicate::str::contains("ctgA").not());
}

#[test]
fn test_stats_missing_input() {
    ace_assembly()
        .args(["stats", "/nonexistent/input.ace"])
        .assert()
        .failure();
}

#[test]
fn test_extract() {
    let (dir, input) = fixture();
    let output = dir.path().join("subset.ace");
    ace_assembly()
        .arg("extract")
        .arg(&input)
        .arg("ctgB")
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("AS 1 1\n"));
    assert!(text.contains("CO ctgB 3 1 "));
    assert!(!text.contains("ctgA"));
    assert!(text.contains("RT{\nrb polymorphism consed 1 2 040923:104844\n}"));
}

#[test]
fn test_extract_unknown_contig() {
    let (dir, input) = fixture();
    ace_assembly()
        .arg("extract")
        .arg(&input)
        .arg("nope")
        .arg("-o")
        .arg(dir.path().join("out.ace"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Contig nope not found"));
}

#[test]
fn test_rewrite_with_base_segments() {
    let (dir, input) = fixture();
    let output = dir.path().join("rewritten.ace");
    ace_assembly()
        .args(["rewrite", "--base-segments", "--format", "tsv"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\t2\t2\t2"));

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("AS 2 2\n\nCO ctgA 4 1 1 U\nACGT\n"));
    assert!(text.contains("BS 1 4 ra"));
    assert!(text.contains("CT{\nctgA comment consed 1 2 040923:104844\ncheck this\n}"));
}

#[test]
fn test_config_file() {
    let (dir, input) = fixture();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"quality_threshold": 35}"#).unwrap();
    let output = dir.path().join("rewritten.ace");
    ace_assembly()
        .arg("rewrite")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    // ctgB qualities (30) now fall below the threshold
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("\nggc\n"));
    assert!(text.contains("\nACGT\n"));
}

#[test]
fn test_invalid_config() {
    let (dir, input) = fixture();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"channel_capacity": 0}"#).unwrap();
    ace_assembly()
        .arg("stats")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
