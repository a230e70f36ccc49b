//! Command-line host for the asset bridge.
//!
//! `solve` loads a serialized package graph, merges package asset manifests into
//! the root `package.json` and runs the selected JavaScript package manager.
//! `detect` reports which managers are available for a directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use asset_bridge_core::adapters::AdapterOptions;
use asset_bridge_core::config::{BridgeConfig, ENV_PREFIX};
use asset_bridge_core::execution::{TokioProcessExecutor, TracingSink};
use asset_bridge_core::fallback::FileFallback;
use asset_bridge_core::graph::PackageGraph;
use asset_bridge_core::models::{CoreError, CoreErrorKind, DetectionInfo, ManagerId};
use asset_bridge_core::registry;
use asset_bridge_core::solver::{SolveError, SolveOutcome, Solver, resolve_target_dir};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "asset-bridge")]
#[command(about = "Merge PHP package asset manifests and run npm, yarn or pnpm", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge asset manifests and install or update JavaScript dependencies
    Solve {
        /// Serialized package graph (JSON) of the host install
        #[arg(short, long)]
        graph: PathBuf,

        /// Run an update instead of an install when the lock file allows it
        #[arg(long)]
        update: bool,

        /// Exclude development-only dependencies from the install
        #[arg(long)]
        no_dev: bool,

        /// Force a package manager (npm, yarn or pnpm)
        #[arg(short, long)]
        manager: Option<String>,
    },
    /// Report the package managers available for a directory
    Detect {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct DetectionReport {
    selected: &'static str,
    managers: Vec<ManagerReport>,
}

#[derive(Debug, Serialize)]
struct ManagerReport {
    name: &'static str,
    display_name: &'static str,
    lock_file: &'static str,
    installed: bool,
    executable_path: Option<PathBuf>,
    version: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Solve {
            graph,
            update,
            no_dev,
            manager,
        } => solve(&graph, update, no_dev, manager),
        Command::Detect { dir, json } => detect(&dir, json),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn solve(
    graph_path: &Path,
    update: bool,
    no_dev: bool,
    manager: Option<String>,
) -> Result<ExitCode, CoreError> {
    let mut graph = PackageGraph::load(graph_path)?;
    default_manifest_dir(&mut graph);

    let mut config =
        BridgeConfig::load(&graph.root.extra, bridge_vars(std::env::vars_os()))?.dev_mode(!no_dev);
    if manager.is_some() {
        config.manager = manager;
    }

    let target = resolve_target_dir(&config, &graph);
    let probe_dir = target
        .clone()
        .unwrap_or_else(|| graph.root.package.install_path.clone());
    let id = registry::select_manager(config.manager.as_deref(), &probe_dir)?;

    let manager = registry::build_manager(
        id,
        Arc::new(TokioProcessExecutor),
        with_search_path(config.adapter_options()),
    );
    let fallback = build_fallback(&config, &graph, target.as_deref(), id);

    let mut solver = Solver::new(manager, config).with_fallback(Arc::new(fallback));
    solver.set_updatable(update);

    match solver.solve(&graph, Arc::new(TracingSink)) {
        Ok(outcome) => {
            match outcome {
                SolveOutcome::Disabled => tracing::info!("asset bridge is disabled"),
                SolveOutcome::NoManifestTarget => {
                    tracing::info!("root package declares no asset manifest, nothing to do")
                }
                SolveOutcome::Merged => tracing::info!("asset manifest merged"),
                SolveOutcome::Completed { action } => tracing::info!(
                    manager = %id,
                    action = action.as_str(),
                    "asset dependencies ready"
                ),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(SolveError::Core(error)) => Err(error),
        Err(error) => {
            if let SolveError::AssetManagerFailed { output, .. } = &error
                && !output.is_empty()
            {
                tracing::debug!(%output, "asset manager output tail");
            }
            tracing::error!("{error}");
            Ok(ExitCode::from(failure_status(error.exit_code())))
        }
    }
}

fn detect(dir: &Path, json: bool) -> Result<ExitCode, CoreError> {
    let selected = registry::select_manager(None, dir)?;
    let managers = registry::descriptors()
        .map(|descriptor| {
            let manager = registry::build_manager(
                descriptor.id,
                Arc::new(TokioProcessExecutor),
                with_search_path(AdapterOptions::default()),
            );
            let DetectionInfo {
                installed,
                executable_path,
                version,
                ..
            } = manager.detect(dir);
            ManagerReport {
                name: descriptor.id.as_str(),
                display_name: descriptor.display_name,
                lock_file: descriptor.lock_file,
                installed,
                executable_path,
                version,
            }
        })
        .collect();
    let report = DetectionReport {
        selected: selected.as_str(),
        managers,
    };

    if json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to render report: {error}"),
            )
        })?;
        println!("{rendered}");
    } else {
        for manager in &report.managers {
            let marker = if manager.name == report.selected {
                "*"
            } else {
                " "
            };
            println!(
                "{marker} {:<5} {:<10} {}",
                manager.name,
                manager.version.as_deref().unwrap_or("-"),
                if manager.installed { "installed" } else { "missing" }
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// A root package with its own `package.json` owns the target manifest.
fn default_manifest_dir(graph: &mut PackageGraph) {
    if graph.root.asset_manifest_dir.is_none() {
        let root_dir = &graph.root.package.install_path;
        if root_dir.join("package.json").is_file() {
            graph.root.asset_manifest_dir = Some(root_dir.clone());
        }
    }
}

/// `ASSET_BRIDGE__*` pairs that are valid UTF-8. Anything else in the environment is ignored.
fn bridge_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Vec<(String, String)> {
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect()
}

fn with_search_path(mut options: AdapterOptions) -> AdapterOptions {
    options.search_path = std::env::var_os("PATH");
    options
}

fn build_fallback(
    config: &BridgeConfig,
    graph: &PackageGraph,
    target: Option<&Path>,
    id: ManagerId,
) -> FileFallback {
    let mut fallback = FileFallback::default();
    if config.fallback_asset
        && let Some(dir) = target
    {
        fallback = fallback.with(FileFallback::for_asset_manifest(
            dir,
            registry::descriptor(id),
        ));
    }
    if config.fallback_host {
        fallback = fallback.with(FileFallback::for_host_state(
            &graph.root.package.install_path,
        ));
    }
    fallback
}

/// The tool's own exit code when it fits a process status, else 1.
fn failure_status(code: Option<i32>) -> u8 {
    match code.and_then(|code| u8::try_from(code).ok()) {
        Some(code) if code != 0 => code,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_bridge_core::models::{PackageNode, RootPackage};

    #[test]
    fn parses_solve_flags() {
        let cli = Cli::try_parse_from([
            "asset-bridge",
            "solve",
            "--graph",
            "graph.json",
            "--update",
            "--no-dev",
            "--manager",
            "pnpm",
        ])
        .unwrap();

        match cli.command {
            Command::Solve {
                graph,
                update,
                no_dev,
                manager,
            } => {
                assert_eq!(graph, PathBuf::from("graph.json"));
                assert!(update);
                assert!(no_dev);
                assert_eq!(manager.as_deref(), Some("pnpm"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn solve_requires_a_graph() {
        assert!(Cli::try_parse_from(["asset-bridge", "solve"]).is_err());
    }

    #[test]
    fn root_with_package_json_owns_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph =
            PackageGraph::new(RootPackage::new(PackageNode::new("acme/app", dir.path())));

        default_manifest_dir(&mut graph);
        assert_eq!(graph.root.asset_manifest_dir, None);

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        default_manifest_dir(&mut graph);
        assert_eq!(graph.root.asset_manifest_dir, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn fallback_follows_configuration_flags() {
        let graph =
            PackageGraph::new(RootPackage::new(PackageNode::new("acme/app", "/srv/app")));
        let target = Path::new("/srv/app/assets");

        let all = build_fallback(
            &BridgeConfig::default(),
            &graph,
            Some(target),
            ManagerId::Pnpm,
        );
        assert_eq!(
            all.paths(),
            &[
                PathBuf::from("/srv/app/assets/package.json"),
                PathBuf::from("/srv/app/assets/pnpm-lock.yaml"),
                PathBuf::from("/srv/app/composer.lock"),
                PathBuf::from("/srv/app/vendor/composer/installed.json"),
            ]
        );

        let config = BridgeConfig {
            fallback_host: false,
            ..BridgeConfig::default()
        };
        assert!(
            build_fallback(&config, &graph, None, ManagerId::Npm)
                .paths()
                .is_empty()
        );
    }

    #[cfg(unix)]
    #[test]
    fn environment_keeps_only_utf8_bridge_pairs() {
        use std::os::unix::ffi::OsStringExt;

        let vars = bridge_vars([
            (OsString::from("ASSET_BRIDGE__MANAGER"), OsString::from("pnpm")),
            (
                OsString::from("ASSET_BRIDGE__ASSET_DIR"),
                OsString::from_vec(vec![0x61, 0xff, 0x62]),
            ),
            (OsString::from_vec(vec![0xfe, 0x41]), OsString::from("x")),
            (OsString::from("HOME"), OsString::from("/root")),
        ]);

        assert_eq!(
            vars,
            vec![("ASSET_BRIDGE__MANAGER".to_string(), "pnpm".to_string())]
        );
    }

    #[test]
    fn tool_exit_codes_pass_through() {
        assert_eq!(failure_status(Some(42)), 42);
        assert_eq!(failure_status(Some(127)), 127);
        assert_eq!(failure_status(Some(-1)), 1);
        assert_eq!(failure_status(Some(300)), 1);
        assert_eq!(failure_status(None), 1);
    }
}
