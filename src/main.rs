//! # QuickBooks Online Connector Entry Point
//!
//! `serve` (the default) runs the HTTP API and the import scheduler. The
//! remaining subcommands run a single unit of work and exit.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use qbo_connector::{
    config::ConfigLoader,
    db,
    qbo::ImportStream,
    server::{AppState, run_server},
    telemetry::init_tracing,
};

#[derive(Debug, Parser)]
#[command(name = "qbo-connector", version, about = "QuickBooks Online sync connector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and the import scheduler
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Import one page of a stream (or of every stream)
    Import {
        #[arg(long)]
        connection: Uuid,
        /// Stream name such as `customer` or `bill_payment`; all streams when omitted
        #[arg(long)]
        stream: Option<String>,
    },
    /// Export one local record
    Export {
        #[arg(long)]
        connection: Uuid,
        #[arg(long)]
        record: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "configuration loaded");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "effective configuration");
    }

    let pool = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::migrate(&pool).await.context("running migrations")?;

    let config = Arc::new(config);
    let pool = Arc::new(pool);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config, pool).await,
        Command::Migrate => {
            tracing::info!("migrations applied");
            Ok(())
        }
        Command::Import { connection, stream } => {
            let state = AppState::new(config, pool)?;
            match stream {
                Some(name) => {
                    let stream: ImportStream = name.parse()?;
                    let outcome = state.sync.import_page(connection, stream).await?;
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                None => {
                    let conn = state.connections.get(connection).await?;
                    let outcomes = state.sync.import_all(&conn).await;
                    println!("{}", serde_json::to_string_pretty(&outcomes)?);
                }
            }
            Ok(())
        }
        Command::Export { connection, record } => {
            let state = AppState::new(config, pool)?;
            let outcome = state.sync.export_record(connection, record).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}
