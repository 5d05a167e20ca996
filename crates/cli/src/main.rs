//! `workflow-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`   : start the API server (optionally with an in-process worker).
//! - `worker`  : start a queue worker.
//! - `migrate` : run pending database migrations.
//! - `validate`: validate a workflow JSON file.
//! - `run`     : run a workflow JSON file in memory and print the result.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{
    ExecutorRegistry, MemoryStore, PgStore, StatusChannel, TriggerEvent, Workflow, WorkflowExecutor,
};
use nodes::http::ReqwestClient;
use nodes::{StatusEvent, StatusPublisher};
use queue::{JobQueue, PgJobQueue, Worker};

use config::{DatabaseArgs, EngineArgs, RealtimeArgs, WorkerArgs};

#[derive(Parser)]
#[command(
    name = "workflow-engine",
    about = "Durable workflow execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Also process queued jobs in this process.
        #[arg(long)]
        with_worker: bool,
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        worker: WorkerArgs,
        #[command(flatten)]
        realtime: RealtimeArgs,
    },
    /// Start a background worker that processes queued jobs.
    Worker {
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        worker: WorkerArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow definition JSON file without a database.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// JSON object seeding the run's context.
        #[arg(long)]
        input: Option<String>,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Logs every status event; stands in for SSE subscribers on the terminal.
struct LogPublisher;

impl StatusPublisher for LogPublisher {
    fn publish(&self, channel: &str, topic: &str, event: StatusEvent) {
        info!(channel, topic, node_id = %event.node_id, "status: {}", event.status);
    }
}

fn registry(engine: &EngineArgs) -> anyhow::Result<Arc<ExecutorRegistry>> {
    let http = ReqwestClient::new(engine.http_timeout())?;
    Ok(Arc::new(ExecutorRegistry::with_builtins(Arc::new(http))?))
}

async fn connect(args: &DatabaseArgs) -> anyhow::Result<db::DbPool> {
    db::pool::create_pool(&args.database_url, args.max_connections)
        .await
        .context("failed to connect to database")
}

fn read_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid workflow JSON")
}

/// Cancelled on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        trigger.cancel();
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            with_worker,
            database,
            engine,
            worker,
            realtime,
        } => {
            let pool = connect(&database).await?;
            let store = Arc::new(PgStore::new(pool.clone()));
            let status = Arc::new(StatusChannel::new(realtime.realtime_config()));
            let executor = Arc::new(
                WorkflowExecutor::new(store.clone(), store, registry(&engine)?, engine.executor_config())
                    .with_publisher(status.clone()),
            );
            let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool, worker.queue_config()));
            let shutdown = shutdown_on_ctrl_c();

            let background = with_worker.then(|| {
                info!("starting in-process worker");
                let worker = Worker::new(queue.clone(), executor.clone(), worker.worker_config());
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            });

            info!("Starting API server on {bind}");
            api::serve(&bind, api::AppState { executor, queue, status }, shutdown.clone()).await?;

            shutdown.cancel();
            if let Some(handle) = background {
                handle.await.context("worker task panicked")?;
            }
        }
        Command::Worker { database, engine, worker } => {
            info!("Starting background worker");
            let pool = connect(&database).await?;
            let store = Arc::new(PgStore::new(pool.clone()));
            let executor = Arc::new(
                WorkflowExecutor::new(store.clone(), store, registry(&engine)?, engine.executor_config())
                    .with_publisher(Arc::new(LogPublisher)),
            );
            let queue = Arc::new(PgJobQueue::new(pool, worker.queue_config()));

            Worker::new(queue, executor, worker.worker_config())
                .run(shutdown_on_ctrl_c())
                .await;
        }
        Command::Migrate { database } => {
            info!("Running migrations");
            let pool = connect(&database).await?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;

            match engine::validate_dag(&workflow) {
                Ok(order) => {
                    println!("✅ Workflow is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path, input, engine } => {
            let workflow = read_workflow(&path)?;
            let workflow_id = workflow.id.clone();

            let mut trigger = TriggerEvent::new(workflow_id);
            if let Some(raw) = input {
                match serde_json::from_str::<serde_json::Value>(&raw).context("--input is not valid JSON")? {
                    serde_json::Value::Object(seed) => trigger = trigger.with_initial_data(seed),
                    _ => bail!("--input must be a JSON object"),
                }
            }

            let store = Arc::new(MemoryStore::with_workflows([workflow]));
            let executor =
                WorkflowExecutor::new(store.clone(), store, registry(&engine)?, engine.executor_config())
                    .with_publisher(Arc::new(LogPublisher));

            match executor.run(trigger).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    eprintln!("❌ Run failed ({} error): {e}", e.tier());
                    if let Some(failure) = e.node_failure() {
                        eprintln!("{}", serde_json::to_string_pretty(&failure.partial)?);
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
