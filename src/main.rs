use anyhow::Context;
use clap::Parser;
use pg_schema_snapshot::{run, setup_logging, Overrides, SnapshotConfig};
use std::path::PathBuf;
use tracing::error;

/// Export a PostgreSQL schema's tables, keys, functions, triggers, enums and
/// indexes to a JSON file
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Output file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Schema to introspect [env: DB_SCHEMA, default: public]
    #[arg(long)]
    schema: Option<String>,

    /// Database host [env: DB_HOST]
    #[arg(long)]
    host: Option<String>,

    /// Database port [env: DB_PORT]
    #[arg(long)]
    port: Option<u16>,

    /// Database user [env: DB_USER]
    #[arg(long)]
    user: Option<String>,

    /// Database name [env: DB_NAME]
    #[arg(long)]
    dbname: Option<String>,

    /// Dotenv file to load before reading the environment (default: .env if present)
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            database: self.dbname.clone(),
            schema: self.schema.clone(),
            output: self.output.clone(),
        }
    }
}

async fn try_main(cli: Cli) -> anyhow::Result<()> {
    let config = SnapshotConfig::load(cli.env_file.as_deref(), &cli.overrides())
        .context("could not load connection settings")?;

    run(&config)
        .await
        .with_context(|| format!("schema snapshot of {:?} failed", config.schema))?;

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = try_main(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
