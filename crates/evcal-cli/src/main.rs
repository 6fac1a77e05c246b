use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use evcal_core::{run_query, EventQuery, QueryParams};
use evcal_storage::{EventStore, FileEventStore};
use evcal_sync::SyncConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "evcal-cli")]
#[command(about = "Athletics events calendar: ingest, serve and query")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion pass over every enabled source.
    Ingest,
    /// Serve the JSON API (and the cron scheduler when enabled).
    Serve,
    /// Print one page of stored events as JSON.
    Query(QueryArgs),
    /// Print the stored detail record for one event.
    Show { id: String },
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[arg(long)]
    page: Option<String>,
    #[arg(long)]
    page_size: Option<String>,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    sort_dir: Option<String>,
    #[arg(long = "type")]
    type_filter: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    after: Option<String>,
    #[arg(long)]
    before: Option<String>,
}

impl From<QueryArgs> for QueryParams {
    fn from(args: QueryArgs) -> Self {
        Self {
            page: args.page,
            page_size: args.page_size,
            sort_by: args.sort_by,
            sort_dir: args.sort_dir,
            type_filter: args.type_filter,
            city: args.city,
            after: args.after,
            before: args.before,
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("EVCAL_LOG_JSON", false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn local_store() -> FileEventStore {
    FileEventStore::new(SyncConfig::from_env().store_dir)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::Ingest => {
            let pipeline = evcal_sync::pipeline_from_env().await?;
            info!(sources = ?pipeline.source_ids(), "starting ingestion");
            let summary = pipeline.run_once().await?;
            println!(
                "ingest complete: run_id={} total={} persisted={} created={} replaced={} skipped={}",
                summary.run_id,
                summary.total_events,
                summary.persisted,
                summary.created,
                summary.replaced,
                summary.skipped
            );
        }
        Commands::Serve => evcal_web::serve_from_env().await?,
        Commands::Query(args) => {
            let summaries = local_store().summaries().await?;
            let query = EventQuery::from_params(&args.into());
            let page = run_query(&summaries, &query).context("querying stored events")?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Show { id } => {
            let event = local_store()
                .event(&id)
                .await?
                .with_context(|| format!("event {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
    }

    Ok(())
}
