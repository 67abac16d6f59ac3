//! `scenario-engine` operator CLI.
//!
//! Available sub-commands:
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a scenario graph JSON file.
//! - `status`   — poll the status of an execution.
//! - `details`  — show execution details including the current node.
//! - `events`   — list the newest events of an execution.
//! - `active`   — list the running executions of a scenario.
//! - `metrics`  — compute (and optionally cache) execution metrics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{PgStore, PoolConfig, Store};
use engine::{Engine, EngineConfig, EventLevel, GraphDocument};

#[derive(Parser)]
#[command(
    name = "scenario-engine",
    about = "Scenario graph execution engine",
    version
)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    max_connections: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending database migrations.
    Migrate,
    /// Validate a scenario graph JSON file.
    Validate {
        /// Path to a `{ "nodes": [...], "connections": [...] }` document.
        path: PathBuf,
    },
    /// Print the pollable status of an execution.
    Status { execution_id: Uuid },
    /// Print execution details.
    Details { execution_id: Uuid },
    /// Print the newest events of an execution.
    Events {
        execution_id: Uuid,
        #[arg(long)]
        limit: Option<usize>,
        /// Drop events below this level (applied after `--limit`).
        #[arg(long)]
        min_level: Option<EventLevel>,
    },
    /// Print the running executions of a scenario, newest first.
    Active {
        scenario_id: Uuid,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print execution metrics.
    Metrics {
        execution_id: Uuid,
        /// Cache the result on the execution. Later calls return the cache.
        #[arg(long)]
        persist: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let graph: GraphDocument =
                serde_json::from_str(&content).context("invalid scenario graph JSON")?;

            match engine::validate_graph(&graph) {
                Ok(order) => {
                    println!("✅ Scenario graph is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Migrate => {
            connect(&cli.database_url, cli.max_connections, true).await?;
            info!("migrations applied successfully");
        }
        command => {
            let store = connect(&cli.database_url, cli.max_connections, false).await?;
            let store: Arc<dyn Store> = Arc::new(store);
            let engine = Engine::new(store, EngineConfig::default());
            run_query(&engine, command).await?;
        }
    }

    Ok(())
}

async fn connect(
    database_url: &Option<String>,
    max_connections: u32,
    migrate: bool,
) -> anyhow::Result<PgStore> {
    let url = database_url
        .as_deref()
        .context("DATABASE_URL is not set (pass --database-url)")?;
    let config = PoolConfig::new(url).max_connections(max_connections);
    PgStore::connect(&config, migrate)
        .await
        .context("failed to open the scenario store")
}

async fn run_query(engine: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status { execution_id } => {
            print_json(&engine.monitoring.get_status(execution_id).await?)
        }
        Command::Details { execution_id } => {
            print_json(&engine.monitoring.get_details(execution_id).await?)
        }
        Command::Events { execution_id, limit, min_level } => {
            print_json(&engine.events.list(execution_id, limit, min_level).await?)
        }
        Command::Active { scenario_id, limit } => {
            print_json(&engine.monitoring.active_executions(scenario_id, limit).await?)
        }
        Command::Metrics { execution_id, persist } => {
            let metrics = engine.metrics.compute_metrics(execution_id).await?;
            let metrics = if persist {
                engine.coordinator.record_metrics(execution_id, metrics).await?
            } else {
                metrics
            };
            print_json(&metrics)
        }
        Command::Migrate | Command::Validate { .. } => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
