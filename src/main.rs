//! Usability Store daemon
//!
//! Usage:
//!   usability-store [serve] [--storage-dir DIR] [--http-port PORT]
//!   usability-store seed [--catalog FILE]
//!
//! `seed` writes the heuristic catalog into the database and exits. Run it
//! once per deployment, before `serve`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use usability_store::services::AuditLogListener;
use usability_store::{CatalogDefinition, Config, HttpServer, Services, StorageError, SurveyDb};

#[derive(Parser, Debug)]
#[command(name = "usability-store")]
#[command(about = "Evaluation backend for usability studies")]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "USABILITY_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "USABILITY_HTTP_PORT")]
    http_port: Option<u16>,

    /// HTTP bind address
    #[arg(long)]
    bind: Option<IpAddr>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Load the heuristic catalog into the database and exit
    Seed {
        /// Catalog TOML file to load instead of the built-in one
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("usability_store=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
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
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config.validate().map_err(StorageError::Config)?;

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;
    let db = Arc::new(SurveyDb::open(&config.database_path())?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Seed { catalog } => seed(db, &config, catalog),
        Command::Serve => serve(db, config).await,
    }
}

fn seed(
    db: Arc<SurveyDb>,
    config: &Config,
    catalog: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let definition = match catalog {
        Some(path) => {
            info!(path = %path.display(), "Loading catalog file");
            CatalogDefinition::parse(&std::fs::read_to_string(&path)?)?
        }
        None => CatalogDefinition::builtin()?,
    };

    let report = Services::new(db, config).seed_catalog(&definition)?;
    println!(
        "Seeded {} heuristics and {} subprinciples",
        report.heuristics, report.subprinciples
    );
    Ok(())
}

async fn serve(db: Arc<SurveyDb>, config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting usability-store"
    );

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let stats = db.stats()?;
    if stats.heuristic_count == 0 {
        warn!("Heuristic catalog is empty; run `usability-store seed` before collecting heuristic responses");
    }
    info!(
        tests = stats.test_count,
        heuristics = stats.heuristic_count,
        accesses = stats.access_count,
        "Database ready"
    );

    let services = Arc::new(Services::new(db.clone(), &config));
    let audit = services.events.spawn_listener(Arc::new(AuditLogListener));
    let http_server = Arc::new(HttpServer::new(services.clone(), &config));

    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    // Run HTTP server with graceful shutdown
    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    audit.abort();

    if let Ok(stats) = db.stats() {
        info!(
            standard_responses = stats.standard_response_count,
            heuristic_responses = stats.heuristic_response_count,
            "Final storage stats"
        );
    }

    Ok(())
}
