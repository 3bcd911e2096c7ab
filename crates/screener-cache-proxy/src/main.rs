//! Screener Cache Proxy - offline cache in front of the stock-screener dashboard.
//!
//! Serves the dashboard through a local port. Static pages and scripts are
//! answered from a versioned cache, JSON data goes to the backend first and
//! falls back to the last good copy, so the dashboard stays usable while the
//! backend is down.

mod handler;
mod server;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use screener_cache_core::{
    CacheController, CacheSettings, HttpFetcher, MemoryStore, NamespaceStore, ProxyConfig,
    Registration, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "screener-cache-proxy")]
#[command(about = "Offline cache proxy for the stock-screener dashboard")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Dashboard origin to proxy (overrides the settings file)
    #[arg(long)]
    upstream: Option<String>,

    /// JSON settings file with the asset manifest
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache version token (overrides the settings file)
    #[arg(long)]
    cache_version: Option<String>,

    /// SQLite database holding the cache namespaces
    #[arg(long)]
    cache_db: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, conflicts_with = "cache_db")]
    memory: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn default_db_path() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| {
            dir.join(ProxyConfig::CACHE_DIR_NAME)
                .join(ProxyConfig::DATABASE_FILE_NAME)
        })
        .ok_or_else(|| anyhow!("No cache directory on this platform; pass --cache-db or --memory"))
}

fn open_store(args: &Args) -> Result<Arc<dyn NamespaceStore>> {
    if args.memory {
        info!("Using in-memory cache");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let path = match &args.cache_db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!("Cache database: {}", path.display());
    let store = SqliteStore::new(&path)
        .with_context(|| format!("Failed to open cache database {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides the level picked by --debug
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Screener Cache Proxy");

    let mut settings = match &args.config {
        Some(path) => CacheSettings::load(path)?,
        None => CacheSettings::default(),
    };
    if let Some(upstream) = &args.upstream {
        settings.origin = upstream.clone();
    }
    if let Some(version) = &args.cache_version {
        settings.version = version.clone();
    }
    settings.validate()?;

    let upstream = settings.origin_url()?;
    info!("Upstream: {} (cache version {})", upstream, settings.version);

    let store = open_store(&args)?;
    let fetcher = Arc::new(HttpFetcher::new()?);
    info!("Upstream request timeout: {:?}", fetcher.timeout());
    let controller = Arc::new(CacheController::new(settings, store, fetcher.clone())?);
    let registration = Arc::new(Registration::new(fetcher));

    // A failed install leaves requests passing straight through.
    if let Err(e) = registration.register(controller).await {
        warn!("Cache disabled, proxying without it: {}", e);
    }

    let addr = server::start_server(registration, upstream, &args.host, args.port).await?;
    info!("Proxy running on http://{}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
