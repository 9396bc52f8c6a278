//! OptiKV Server Binary
//!
//! Starts the TCP server for OptiKV.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use optikv::{Config, Server, TableStore};

/// OptiKV Server
#[derive(Parser, Debug)]
#[command(name = "optikv-server")]
#[command(about = "Table-structured key-value store with versioned objects")]
#[command(version)]
struct Args {
    /// Address to listen on (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Worker pool size; one connection is served per worker
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Largest accepted value in MB
    #[arg(short = 'v', long, default_value = "1")]
    max_value_mb: usize,
}

fn main() {
    // RUST_LOG overrides the default filter
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,optikv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("OptiKV Server v{}", optikv::VERSION);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_value_size(args.max_value_mb * 1024 * 1024)
        .build();

    let store = Arc::new(TableStore::new(config.max_value_size));

    let mut server = match Server::new(config, store) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind listener: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
