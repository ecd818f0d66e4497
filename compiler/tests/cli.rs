// CLI tests: drive the `patchc` binary over the fixture documents.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn fixture(name: &str) -> PathBuf {
    project_root().join("fixtures").join(name)
}

fn patchc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_patchc"))
}

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("{}_{}_{}.{}", prefix, std::process::id(), n, ext))
}

fn run(patch: &str, extra: &[&str]) -> Output {
    Command::new(patchc_binary())
        .arg(fixture(patch))
        .arg("-r")
        .arg(fixture("registry.json"))
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run patchc")
}

#[test]
fn clean_patch_exits_zero_with_empty_diagnostics() {
    let out = run("pulse_grid.json", &[]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let diags: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(diags, serde_json::json!([]));
}

#[test]
fn emit_order() {
    let out = run("pulse_grid.json", &["--emit", "order"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines.last(), Some(&"dots"));
}

#[test]
fn emit_materialized_adds_providers() {
    let out = run("pulse_grid.json", &["--emit", "materialized"]);
    let patch: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(patch["blocks"].as_array().unwrap().len(), 10);
    assert_eq!(patch["edges"].as_array().unwrap().len(), 8);
}

#[test]
fn no_materialize_keeps_patch() {
    let out = run("pulse_grid.json", &["--emit", "materialized", "--no-materialize"]);
    let patch: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(patch["blocks"].as_array().unwrap().len(), 4);
}

#[test]
fn emit_dot_to_file() {
    let path = temp_path("patchc_dot", "dot");
    let out = run(
        "pulse_grid.json",
        &["--emit", "dot", "-o", path.to_str().unwrap()],
    );
    assert_eq!(out.status.code(), Some(0));
    let dot = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert!(dot.starts_with("digraph patch {"));
    assert!(dot.contains("bus_energy"));
}

#[test]
fn build_info_is_json() {
    let out = run("pulse_grid.json", &["--emit", "build-info"]);
    let info: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(info["patch_hash"].as_str().unwrap().len(), 64);
    assert_eq!(info["registry_fingerprint"].as_str().unwrap().len(), 64);
}

#[test]
fn cyclic_patch_exits_one() {
    let out = run("cyclic.json", &[]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("E_CYCLE_DETECTED"), "{stderr}");
    assert!(stderr.contains("E_TIME_ROOT_MISSING"), "{stderr}");
}

#[test]
fn missing_patch_exits_two() {
    let out = Command::new(patchc_binary())
        .arg(project_root().join("fixtures/does_not_exist.json"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn duplicate_registry_exits_two() {
    let out = run("pulse_grid.json", &["-r", fixture("registry.json").to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("TimeRoot"));
}
