//! kvstored — the network server binary.

mod cli;
mod config;
mod daemonize;
mod dispatch;
mod logging;
mod registry;
mod server;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use kv_engine::{Engine, EngineConfig};

use config::ServerConfig;
use server::ServerState;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut server_config = ServerConfig::load().context("failed to load configuration")?;
    cli::apply_cli_overrides(&mut server_config, &args).context("failed to parse command-line flags")?;

    if server_config.daemonize {
        daemonize::daemonize().context("failed to daemonize")?;
    }

    let _logging_guard = logging::init(server_config.log_file.as_deref()).context("failed to initialize logging")?;

    let runtime = build_runtime(&server_config).context("failed to build tokio runtime")?;
    runtime.block_on(run(server_config))
}

fn build_runtime(config: &ServerConfig) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.workers > 0 {
        builder.worker_threads(config.workers);
    }
    builder.build()
}

async fn run(config: ServerConfig) -> Result<()> {
    tracing::info!(bind = %config.bind, port = config.port, db_file = %config.db_file.display(), "kvstored starting");

    let engine = Engine::open(EngineConfig {
        capacity: config.capacity,
        db_file: Some(config.db_file.clone()),
        auto_save: config.auto_save,
    })
    .context("failed to open engine")?;
    let engine = Arc::new(engine);

    let state = Arc::new(ServerState::new(engine.clone()));

    let shutdown_state = state.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        shutdown_state.shutdown.store(true, Ordering::Relaxed);
    });

    let result = server::run(&config.bind, config.port, config.backlog, state.clone()).await;

    signal_task.abort();

    if config.auto_save {
        tracing::info!("saving engine state before exit");
        if let Err(e) = engine.save(None) {
            tracing::warn!(error = %e, "final save failed");
        }
    }

    result
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
