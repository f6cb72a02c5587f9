//! PostgreSQL schema snapshot - Library
//! Reads catalog metadata for one schema and exports it as a single JSON document

pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod export;
pub mod snapshot;

pub use config::{ConnectionConfig, Overrides, SnapshotConfig};
pub use document::Snapshot;
pub use error::{Category, Result, SnapshotError};

use db::postgres::PostgresCatalog;
use tracing::{debug, info};

/// Connect, extract every category, and write the output file.
///
/// The connection is closed before the file is written. Nothing is written
/// unless every query succeeded.
pub async fn run(config: &SnapshotConfig) -> Result<Snapshot> {
    let conn = &config.connection;
    info!(host = %conn.host, port = conn.port, database = %conn.database, "connecting");

    let catalog = PostgresCatalog::connect(conn, &config.schema).await?;
    debug!(schema = %config.schema, "connected");
    let result = snapshot::build_snapshot(&catalog).await;
    catalog.close().await;

    let snapshot = result?;
    export::write_snapshot(&snapshot, &config.output)?;
    info!("Database metadata exported to '{}'", config.output.display());

    Ok(snapshot)
}

/// Initialize the tracing subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
