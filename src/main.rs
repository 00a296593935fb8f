use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use docscrub::{
    config::DocscrubConfig,
    db::DbPool,
    jobs::{Scrubber, start_scrub_worker},
    observability,
    services::create_blob_store,
};
use tokio_util::sync::CancellationToken;

/// CLI arguments for docscrub
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Garbage collector for deleted document versions",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "docscrub.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run a single scrub pass and print the report as JSON
    Run {
        /// Log what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Override `scrub.batch_size` from the config file
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Scrub on `scrub.interval_secs` until interrupted
    Worker,
    /// Run database migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    Migrate,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = load_config(&args.config);

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    match args.command {
        Command::Run {
            dry_run,
            batch_size,
        } => {
            if dry_run {
                config.scrub.dry_run = true;
            }
            if let Some(batch_size) = batch_size {
                config.scrub.batch_size = batch_size;
                config.scrub.page_size = config.scrub.page_size.max(batch_size);
                if let Err(e) = config.scrub.validate() {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
            run_once(config).await;
        }
        Command::Worker => run_worker(config).await,
        Command::Migrate => run_migrate(config).await,
    }
}

fn load_config(path: &Path) -> DocscrubConfig {
    match DocscrubConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Connect to the database and blob store the config points at.
async fn connect(config: &DocscrubConfig) -> Scrubber {
    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    if let Err(e) = db.health_check().await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(1);
    }

    if config.database.run_migrations()
        && let Err(e) = db.run_migrations().await
    {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }

    let blobs = match create_blob_store(&config.storage.blobs).await {
        Ok(blobs) => blobs,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize blob storage");
            std::process::exit(1);
        }
    };

    tracing::info!(backend = blobs.backend_name(), "Blob storage ready");
    Scrubber::from_pool(&db, blobs, config.scrub.clone())
}

async fn run_once(config: DocscrubConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    let scrubber = connect(&config).await;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    match scrubber.run(&cancel).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Scrub run failed");
            std::process::exit(1);
        }
    }
}

async fn run_worker(config: DocscrubConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    let scrubber = Arc::new(connect(&config).await);
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(start_scrub_worker(scrubber, cancel.clone()));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, finishing current batch...");
    cancel.cancel();

    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Scrub worker task failed");
        std::process::exit(1);
    }
}

async fn run_migrate(config: DocscrubConfig) {
    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    if let Err(e) = db.run_migrations().await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }

    tracing::info!("Migrations complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
