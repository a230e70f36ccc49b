#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use asset_bridge_core::adapters::{AdapterOptions, AssetManager, Yarn, YarnManager};
use asset_bridge_core::config::BridgeConfig;
use asset_bridge_core::execution::{
    NullSink, ProcessExitStatus, SPAWN_FAILURE_EXIT_CODE, TokioProcessExecutor,
};
use asset_bridge_core::graph::PackageGraph;
use asset_bridge_core::models::{AssetAction, PackageNode, RootPackage};
use asset_bridge_core::solver::{SolveError, SolveOutcome, Solver};

fn script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-yarn");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn yarn(options: AdapterOptions) -> YarnManager {
    YarnManager::new(Yarn, Arc::new(TokioProcessExecutor), options)
}

fn graph(dir: &Path) -> PackageGraph {
    let mut root = RootPackage::new(PackageNode::new("acme/app", dir));
    root.asset_manifest_dir = Some(dir.to_path_buf());
    PackageGraph::new(root)
}

#[test]
fn timed_out_install_reports_termination_not_missing_binary() {
    let bin_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let manager = yarn(
        AdapterOptions::default()
            .binary(script(bin_dir.path(), "sleep 5"))
            .timeout(Duration::from_millis(300)),
    );

    let output = manager.run(AssetAction::Install, work_dir.path(), Arc::new(NullSink));

    assert_eq!(output.status, ProcessExitStatus::Terminated);
    assert_eq!(output.status.code(), None);
    assert!(output.stderr_lossy().contains("timed out"));
}

#[test]
fn missing_binary_reports_spawn_failure_code() {
    let work_dir = tempfile::tempdir().unwrap();
    let manager = yarn(AdapterOptions::default().binary("/nonexistent/asset-bridge-yarn"));

    let output = manager.run(AssetAction::Install, work_dir.path(), Arc::new(NullSink));

    assert_eq!(
        output.status,
        ProcessExitStatus::ExitCode(SPAWN_FAILURE_EXIT_CODE)
    );
}

#[test]
fn timed_out_solve_fails_without_an_exit_code() {
    let bin_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(
        Box::new(yarn(
            AdapterOptions::default()
                .binary(script(bin_dir.path(), "sleep 5"))
                .timeout(Duration::from_millis(300)),
        )),
        BridgeConfig::default(),
    );

    match solver.solve(&graph(work_dir.path()), Arc::new(NullSink)) {
        Err(error @ SolveError::AssetManagerFailed { .. }) => {
            assert_eq!(error.exit_code(), None);
            assert!(error.to_string().contains("termination by signal"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn solve_runs_the_tool_from_a_current_thread_runtime() {
    let work_dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(
        Box::new(yarn(AdapterOptions::default().binary("/bin/true"))),
        BridgeConfig::default(),
    );

    let outcome = solver
        .solve(&graph(work_dir.path()), Arc::new(NullSink))
        .expect("tool exits successfully");

    assert_eq!(
        outcome,
        SolveOutcome::Completed {
            action: AssetAction::Install
        }
    );
    assert!(work_dir.path().join("package.json").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn solve_runs_the_tool_from_a_multi_thread_runtime() {
    let work_dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(
        Box::new(yarn(AdapterOptions::default().binary("/bin/true"))),
        BridgeConfig::default(),
    );

    let outcome = solver
        .solve(&graph(work_dir.path()), Arc::new(NullSink))
        .expect("tool exits successfully");

    assert_eq!(
        outcome,
        SolveOutcome::Completed {
            action: AssetAction::Install
        }
    );
}
