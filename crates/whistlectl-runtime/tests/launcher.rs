//! Launch detection against real short-lived processes.

#![cfg(unix)]

use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use whistlectl_core::ControllerError;
use whistlectl_runtime::{BoundAddressMarker, LaunchCommand, launch, pid_exists, run_to_completion};

fn sh(script: &str) -> LaunchCommand {
    LaunchCommand::new("sh").args(["-c", script])
}

#[tokio::test]
async fn test_marker_on_stdout_succeeds() {
    let cmd = sh("echo booting; echo 'listening on http://127.0.0.1:9422/'; exit 0");
    let outcome = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_secs(10))
        .await
        .unwrap();

    assert!(outcome.matched_line.contains("127.0.0.1:9422"));
    assert!(outcome.output.contains("booting"));
}

#[tokio::test]
async fn test_marker_on_stderr_succeeds() {
    let cmd = sh("echo 'bound 127.0.0.1:9500' >&2; sleep 5");
    let started = Instant::now();

    launch(&cmd, &BoundAddressMarker::new(9500), Duration::from_secs(10))
        .await
        .unwrap();

    // Resolves on the marker, not on process exit.
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_marker_for_other_port_is_ignored() {
    let cmd = sh("echo 'http://127.0.0.1:9423/'; exit 0");
    let err = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_secs(10))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::LaunchProcess { code: Some(0), .. }));
}

#[tokio::test]
async fn test_nonzero_exit_reports_code_and_output() {
    let cmd = sh("echo 'port in use' >&2; exit 2");
    let err = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_secs(10))
        .await
        .unwrap_err();

    match err {
        ControllerError::LaunchProcess { code, output, .. } => {
            assert_eq!(code, Some(2));
            assert!(output.contains("port in use"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_silent_process_times_out() {
    let cmd = sh("sleep 30");
    let started = Instant::now();

    let err = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::LaunchTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_kills_launch_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let cmd = sh(&format!("echo $$ > '{}'; exec sleep 30", pid_file.display()));

    let err = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::LaunchTimeout { .. }));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!pid_exists(pid), "launch process {pid} still running");
}

#[tokio::test]
async fn test_timeout_kills_forked_children() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("child-pid");
    let cmd = sh(&format!("sleep 30 & echo $! > '{}'; wait", pid_file.display()));

    let err = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::LaunchTimeout { .. }));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    // The forked child is reaped by init, not by us; allow it a moment.
    let deadline = Instant::now() + Duration::from_secs(3);
    while pid_exists(pid) && !is_zombie(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!pid_exists(pid) || is_zombie(pid), "forked child {pid} still running");
}

/// Exited but not yet reaped by its new parent.
fn is_zombie(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system
        .process(target)
        .is_some_and(|p| p.status() == ProcessStatus::Zombie)
}

#[tokio::test]
async fn test_missing_binary_is_launch_failure() {
    let cmd = LaunchCommand::new("/nonexistent/whistlectl-test/w2").arg("start");
    let err = launch(&cmd, &BoundAddressMarker::new(9422), Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::LaunchProcess { code: None, .. }));
}

#[tokio::test]
async fn test_custom_predicate() {
    let cmd = sh("echo 'READY'; sleep 5");
    let predicate = |line: &str| line == "READY";

    let outcome = launch(&cmd, &predicate, Duration::from_secs(10)).await.unwrap();
    assert_eq!(outcome.matched_line, "READY");
}

#[tokio::test]
async fn test_run_to_completion_captures_both_streams() {
    let out = run_to_completion(&sh("echo out; echo err >&2; exit 4"), Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(out.code, Some(4));
    assert!(!out.success);
    assert_eq!(out.output, "out\nerr");
}
