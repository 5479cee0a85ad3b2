//! flatkv Server Binary
//!
//! Opens the configured backend and serves RESP over TCP. Ctrl+C or
//! SIGTERM stops the accept loop, then the sweeper, then closes the backend.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use flatkv::network::Server;
use flatkv::store::Sweeper;
use flatkv::{BackendOptions, CommandTable, Config, FlatError, Registry, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// flatkv Server
#[derive(Parser, Debug)]
#[command(name = "flatkv-server")]
#[command(about = "Redis-protocol key-value server over pluggable storage backends")]
#[command(version)]
struct Args {
    /// Data directory (passed to the backend as its name)
    #[arg(short, long, default_value = "./flatkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Storage backend driver
    #[arg(short, long, default_value = "lsm")]
    backend: String,

    /// Backend option as key=value (repeatable), e.g. sync=always
    #[arg(short = 'o', long = "backend-opt")]
    backend_opts: Vec<String>,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Background expiry sweep interval in seconds (0 disables it)
    #[arg(long, default_value = "0")]
    sweep_interval_secs: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,flatkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }

    tracing::info!("server stopped");
}

fn run(args: Args) -> flatkv::Result<()> {
    tracing::info!(version = flatkv::VERSION, "flatkv server starting");

    let sweep_interval = (args.sweep_interval_secs > 0)
        .then(|| Duration::from_secs(args.sweep_interval_secs));

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .backend(&args.backend)
        .backend_options(BackendOptions::from_pairs(&args.backend_opts)?)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .sweep_interval(sweep_interval)
        .build();

    // Built once, read-only from here on
    let registry = Registry::builtin();
    let backend = registry.open(
        &config.backend,
        &config.data_dir.to_string_lossy(),
        &config.backend_options,
    )?;

    let store = Arc::new(Store::new(Arc::clone(&backend)));
    let commands = Arc::new(CommandTable::builtin());

    let sweeper = match config.sweep_interval {
        Some(interval) => Some(Sweeper::spawn(Arc::clone(&store), interval)?),
        None => None,
    };

    let server = Server::bind(config, store, commands)?;
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("received shutdown signal");
        shutdown.shutdown();
    })
    .map_err(|e| FlatError::Config(format!("cannot install signal handler: {}", e)))?;

    let result = server.run();

    // Sweeper stops before the backend closes
    drop(sweeper);
    if let Err(e) = backend.close() {
        tracing::warn!(error = %e, "backend close failed");
        return result.and(Err(e));
    }
    result
}
