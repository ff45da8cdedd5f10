//! scry CLI entry point.
//!
//! Loads the evaluator module, the board store and the font set, then serves
//! the viewer and RPC surfaces.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scry_board::{BoardStore, ExecutionSession, MemoryBoardStore, RestBoardStore};
use scry_common::ConfigFile;
use scry_common::config_file::StoreBackend;
use scry_core::{CompiledModule, WasmEngine, WasmEvaluator};
use scry_render::{FontSet, Rasterizer};
use scry_server::{AppState, ScryServer, ServerConfig};

/// Scripted drawing boards served as SVG and PNG views.
#[derive(Debug, Parser)]
#[command(name = "scry", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "SCRY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, e.g. 0.0.0.0:8080.
    #[arg(long, env = "SCRY_BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Evaluator WebAssembly module.
    #[arg(long, env = "SCRY_MODULE")]
    module: Option<PathBuf>,

    /// Bearer token required on RPC calls.
    #[arg(long, env = "SCRY_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Base URL used in view links.
    #[arg(long, env = "SCRY_PUBLIC_URL")]
    public_url: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,scry=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_store(config: &ConfigFile) -> anyhow::Result<Arc<dyn BoardStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory board store; boards are lost on restart");
            Ok(Arc::new(MemoryBoardStore::new()))
        }
        StoreBackend::Postgrest => {
            let Some(url) = config.store.url.as_deref() else {
                bail!("store.url is required for the postgrest backend");
            };
            let store = RestBoardStore::new(url, config.store.api_key.clone())
                .context("Failed to configure PostgREST store")?;
            info!(url = %url, "Using PostgREST board store");
            Ok(Arc::new(store))
        }
    }
}

fn build_evaluator(config: &ConfigFile) -> anyhow::Result<WasmEvaluator> {
    let engine = WasmEngine::new(&config.runtime.engine).context("Failed to create engine")?;

    let path = &config.evaluator.module_path;
    let module = CompiledModule::from_file(engine.inner(), path)
        .with_context(|| format!("Failed to load evaluator module '{path}'"))?;

    let mut linker = wasmtime::Linker::new(engine.inner());
    scry_host::register_all(&mut linker).context("Failed to register host functions")?;

    info!(
        module = %path,
        hash = %module.content_hash(),
        start_hook = module.has_start(),
        "Evaluator module loaded"
    );
    Ok(WasmEvaluator::new(
        engine,
        module,
        linker,
        config.runtime.execution.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting scry");

    let mut config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => ConfigFile::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind.to_string();
    }
    if let Some(module) = &cli.module {
        config.evaluator.module_path = module.display().to_string();
    }
    if cli.token.is_some() {
        config.auth.token = cli.token.clone();
    }
    if cli.public_url.is_some() {
        config.server.public_url = cli.public_url.clone();
    }

    let server_config =
        ServerConfig::from_file(&config.server).context("Invalid server configuration")?;
    let public_url = config
        .server
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", server_config.bind_addr));

    let evaluator = build_evaluator(&config)?;
    let store = build_store(&config)?;
    let fonts = FontSet::load(&config.render).context("Failed to load fonts")?;
    let rasterizer = Rasterizer::new(fonts, config.render.max_raster_dimension);

    if !config.auth.is_configured() {
        warn!("No auth token configured; the RPC surface is open to anyone who can reach it");
    }

    let session = ExecutionSession::new(Arc::new(evaluator), store, config.limits.clone());
    let state = AppState::new(session, rasterizer, &public_url, config.auth.token.clone());

    info!(bind_addr = %server_config.bind_addr, public_url = %public_url, "Configuration loaded");
    info!("Available endpoints:");
    info!("  GET  /view/:share_id      - Composed SVG view");
    info!("  GET  /view/:share_id/svg  - Raw artifact");
    info!("  GET  /view/:share_id/png  - PNG with description");
    info!("  GET  /view/:share_id/events - Board change stream (SSE)");
    info!("  POST /rpc/execute         - Run a script against a board");
    info!("  POST /rpc/list            - List boards");
    info!("  POST /rpc/history         - Archived artifacts of a board");
    info!("  GET  /health, /ready");

    ScryServer::new(state, server_config)
        .run()
        .await
        .context("Server error")?;

    Ok(())
}
