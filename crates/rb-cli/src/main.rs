// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use clap::{Parser, Subcommand};
use rb_config::RunbookConfig;
use rb_core::BlockOutputs;
use rb_daemon::{build_app, AppState};
use rb_exec::Engine;
use rb_pathsafe::RootFs;
use rb_registry::{FileWatcher, Mode, Registry};
use rb_workspace::Workspace;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for a startup failure: port in use, path not found, or a
/// schema error in a referenced file at load time.
const EXIT_STARTUP_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "rb", version, about = "Runbook server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve a runbook document with a frozen-at-load script registry.
    Serve {
        /// Directory containing the runbook document.
        path: PathBuf,
    },
    /// Serve a runbook document, reloading the registry on file changes.
    Watch {
        /// Directory containing the runbook document.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("rb=debug,rb_exec=debug,rb_daemon=debug")
    } else {
        EnvFilter::new("rb=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match rb_config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let result = match cli.command {
        Commands::Serve { path } => run(path, Mode::Frozen, config).await,
        Commands::Watch { path } => run(path, Mode::Watch, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::from(EXIT_STARTUP_FAILURE),
    }
}

async fn run(path: PathBuf, mode: Mode, config: RunbookConfig) -> Result<(), ()> {
    let root = RootFs::new(&path).map_err(|err| {
        error!(error = %err, path = %path.display(), "runbook root not found");
    })?;

    let registry = Registry::load(root.clone(), mode).map_err(|err| {
        error!(error = %err, "failed to load script registry");
    })?;
    let registry = Arc::new(registry);

    let workspace = Workspace::new(root.clone()).map_err(|err| {
        error!(error = %err, "failed to initialize generated-files workspace");
    })?;
    let workspace = Arc::new(workspace);

    let block_outputs = Arc::new(BlockOutputs::new());
    let grace_period = Duration::from_secs(config.pty_grace_period_secs);
    let engine = Arc::new(Engine::new(registry.clone(), workspace.clone(), block_outputs.clone(), grace_period));

    let state = Arc::new(AppState {
        root: root.clone(),
        registry: registry.clone(),
        workspace,
        block_outputs,
        engine,
        config: config.clone(),
        cancellations: Mutex::new(BTreeMap::new()),
    });

    if mode == Mode::Watch {
        spawn_watcher(root.root().to_path_buf(), registry);
    }

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.map_err(|err| {
        error!(error = %err, bind_addr = %config.bind_addr, "failed to bind");
    })?;
    info!(bind_addr = %config.bind_addr, root = %root.root().display(), mode = ?mode, "runbook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server error");
        })
}

/// Watch the runbook root for changes and rebuild the registry atomically
/// on each debounced batch. Watch failures are logged but non-fatal:
/// the server keeps serving the last good snapshot.
fn spawn_watcher(root: PathBuf, registry: Arc<Registry>) {
    tokio::spawn(async move {
        let mut watcher = match FileWatcher::new(&root) {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(error = %err, "failed to start filesystem watcher");
                return;
            }
        };

        while let Some(event) = watcher.recv().await {
            match registry.reload() {
                Ok(()) => info!(path = %event.path.display(), "registry reloaded"),
                Err(err) => error!(error = %err, path = %event.path.display(), "registry reload failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    info!("shutdown signal received");
}
