//! Runs the `tiled-matmul` binary and checks its stdout and exit status.

use std::process::{Command, Output};

use tm_kernel::config::is_specialized;
use tm_kernel::DEFAULT_TILE;

fn tiled_matmul(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tiled-matmul"))
        .args(args)
        .env_remove("TM_TILE")
        .env_remove("TM_STRATEGY")
        .env_remove("TM_DEVICE")
        .env_remove("TM_VERIFY")
        .output()
        .expect("failed to start tiled-matmul")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn test_verified_run_succeeds() {
    let out = tiled_matmul(&["20", "--tile", "4", "--device", "host", "--verify"]);
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "N=20 TILE=4");
    assert!(lines[1].starts_with("Running on: host"));
    assert_eq!(lines[2], "Verification PASSED");
}

#[test]
fn test_default_tile_runs() {
    let out = tiled_matmul(&["8", "--device", "host"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).starts_with(&format!("N=8 TILE={DEFAULT_TILE}\n")));
}

#[test]
fn test_allocation_failure_exits_1() {
    // 8x8 f32 needs 256 bytes per matrix.
    let out = tiled_matmul(&["8", "--device", "host", "--memory-limit", "600"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!stdout(&out).contains("Verification"));
}

#[test]
fn test_mismatch_exits_2_only_when_verifying() {
    // A negative tolerance rejects every element.
    let out = tiled_matmul(&["4", "--device", "host", "--verify", "--tolerance=-1"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stdout(&out).ends_with("Verification FAILED\n"));

    let out = tiled_matmul(&["4", "--device", "host", "--tolerance=-1"]);
    assert_eq!(out.status.code(), Some(0));
}

#[cfg(not(feature = "wgpu"))]
#[test]
fn test_missing_accelerator_exits_3() {
    let out = tiled_matmul(&["4", "--device", "accelerator"]);
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_tile_outside_family() {
    let tile = (1..).find(|&t| !is_specialized(t)).unwrap_or(3).to_string();

    let out = tiled_matmul(&["16", "--tile", &tile, "--device", "host", "--verify"]);
    assert_eq!(out.status.code(), Some(0));

    let out = tiled_matmul(&[
        "16", "--tile", &tile, "--strategy", "runtime", "--device", "host", "--verify",
    ]);
    assert_eq!(out.status.code(), Some(0));

    let out = tiled_matmul(&[
        "16",
        "--tile",
        &tile,
        "--strategy",
        "specialized",
        "--device",
        "host",
    ]);
    assert_eq!(out.status.code(), Some(4));
}

#[test]
fn test_usage_errors_exit_4() {
    assert_eq!(tiled_matmul(&["--tile", "0", "--device", "host"]).status.code(), Some(4));
    assert_eq!(tiled_matmul(&["--strategy", "jit"]).status.code(), Some(4));
    assert_eq!(tiled_matmul(&["not-a-number"]).status.code(), Some(4));
}
