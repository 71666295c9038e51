//! LP Genealogy Daemon
//!
//! Serves forward/backward traces and recall simulations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! lp-genealogy
//!
//! # Start with custom config
//! lp-genealogy --config /path/to/config.toml
//!
//! # Load fixture data before serving
//! lp-genealogy --storage-dir /tmp/genealogy --seed fixtures.json
//! ```
//!
//! ## HTTP API
//!
//! - `GET /health` - Health check
//! - `GET /tracing/forward?lp_id=..` - Forward trace
//! - `GET /tracing/backward?lp_id=..` - Backward trace
//! - `GET /tracing/production-event?production_event_id=..` - Links of one production event
//! - `POST /tracing/recall` - Recall simulation

use anyhow::Context;
use clap::Parser;
use lp_genealogy::services::spawn_logging_listener;
use lp_genealogy::{Config, GenealogyDb, HttpServer, SeedData, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lp-genealogy")]
#[command(about = "License plate genealogy tracing and recall simulation")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "LP_GENEALOGY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "LP_GENEALOGY_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "LP_GENEALOGY_HTTP_PORT")]
    http_port: Option<u16>,

    /// JSON file of license plates and genealogy links to import at startup
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("lp_genealogy=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        default_max_depth = config.default_max_depth,
        recall_max_depth = config.recall_max_depth,
        max_nodes = config.max_nodes,
        "Starting lp-genealogy"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(GenealogyDb::open(&config.storage_dir)?);

    if let Some(seed_path) = &args.seed {
        let seed = SeedData::load(seed_path)
            .with_context(|| format!("reading seed file {}", seed_path.display()))?;
        let imported = db.bulk_insert(&seed)?;
        info!(
            license_plates = imported.license_plates,
            genealogy_links = imported.genealogy_links,
            "Imported seed data"
        );
    }

    let stats = db.stats()?;
    info!(
        license_plates = stats.license_plate_count,
        genealogy_links = stats.genealogy_link_count,
        orgs = stats.org_count,
        "Genealogy database ready"
    );

    let services = Arc::new(Services::new(db, config.trace_defaults()));
    let listener = spawn_logging_listener(services.events.clone());

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(services, http_addr));
    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();
    Ok(())
}
