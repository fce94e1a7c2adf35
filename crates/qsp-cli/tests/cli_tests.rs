//! End-to-end tests of the `qsp` binary.

use std::process::{Command, Output};

fn qsp(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qsp"))
        .args(args)
        .output()
        .expect("failed to run qsp")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ============================================================================
// gate-counts
// ============================================================================

#[test]
fn gate_counts_rejects_empty_lists() {
    let output = qsp(&["gate-counts", "--n", ",", "--card", "2,4"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("empty --n or --card"));
}

#[test]
fn gate_counts_rejects_missing_binary() {
    let output = qsp(&[
        "gate-counts",
        "--n",
        "3",
        "--card",
        "2",
        "--bin",
        "/nonexistent/prepare_state",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing binary"));
}

// ============================================================================
// generate
// ============================================================================

#[test]
fn generate_prints_sparse_state() {
    let output = qsp(&["generate", "-n", "4", "-c", "5", "-s", "7"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["support"].as_array().unwrap().len(), 5);
    assert_eq!(json["amplitudes"].as_array().unwrap().len(), 5);
    assert_eq!(json["mode"], "randomized");
}

#[test]
fn generate_is_reproducible() {
    let a = qsp(&["generate", "-n", "5", "-c", "3", "-s", "11", "--mode", "uniform"]);
    let b = qsp(&["generate", "-n", "5", "-c", "3", "-s", "11", "--mode", "uniform"]);
    assert_eq!(a.stdout, b.stdout);
}

#[test]
fn generate_rejects_oversized_cardinality() {
    let output = qsp(&["generate", "-n", "3", "-c", "9"]);
    assert_eq!(output.status.code(), Some(1));
}

// ============================================================================
// sweep
// ============================================================================

#[test]
fn sweep_with_reference_only_writes_tables() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().to_str().unwrap();
    let output = qsp(&[
        "sweep", "--n", "3,4", "--card", "2,4,9", "--eps", "1e-3,1e-4", "--repeats", "2",
        "--seed", "42", "-o", out,
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    for name in [
        "raw_eps1e-3.csv",
        "aggregate_eps1e-3.csv",
        "summary_eps1e-3.json",
        "raw_eps1e-4.csv",
        "aggregate_eps1e-4.csv",
        "summary_eps1e-4.json",
    ] {
        assert!(dir.path().join(name).exists(), "{name}");
    }

    let aggregate = std::fs::read_to_string(dir.path().join("aggregate_eps1e-3.csv")).unwrap();
    let header = aggregate.lines().next().unwrap();
    assert!(header.starts_with("n,cardinality,eps,reference_successes"));
    // (3,2) (3,4) (4,2) (4,4) (4,9)
    assert_eq!(aggregate.lines().count(), 6);
}

#[test]
fn sweep_without_backends_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = qsp(&[
        "sweep",
        "--n",
        "3",
        "--card",
        "2",
        "--reference",
        "off",
        "-o",
        dir.path().to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("No backend available"));
}

#[test]
fn sweep_with_missing_native_binary_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let output = qsp(&[
        "sweep",
        "--native-bin",
        "/nonexistent/prepare_state",
        "-o",
        dir.path().to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing binary"));
    assert!(!dir.path().join("raw_eps1e-3.csv").exists());
}

#[test]
fn sweep_with_unavailable_native_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let output = qsp(&[
        "sweep",
        "--n",
        "3",
        "--card",
        "2",
        "--native-lib",
        "/nonexistent/libqsp.so",
        "-o",
        dir.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let raw = std::fs::read_to_string(dir.path().join("raw_eps1e-3.csv")).unwrap();
    let mut lines = raw.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let native_t = header.iter().position(|h| *h == "native_t").unwrap();
    let reference_t = header.iter().position(|h| *h == "reference_t").unwrap();
    for line in lines {
        let cells: Vec<&str> = line.split(',').collect();
        assert_eq!(cells[native_t], "NA");
        assert_ne!(cells[reference_t], "NA");
    }
}

// ============================================================================
// version
// ============================================================================

#[test]
fn version_prints_package_version() {
    let output = qsp(&["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}
