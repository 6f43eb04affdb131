//! `gatecheck`: admission station binary.
//!
//! Usage:
//!   gatecheck [run]                         - operator console (default)
//!   gatecheck sync                          - one sync cycle
//!   gatecheck stats                         - sold / used counters
//!   gatecheck flush --tickets|--checkins|--all

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use gatecheck_core::store::FlushScope;
use gatecheck_station::{AppContext, CheckInEngine, Config, console};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gatecheck", version, about = "Event admission check-in station")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the operator console
    Run,
    /// Pull new tickets from the ticket authority once
    Sync,
    /// Print admission counters
    Stats,
    /// Delete local data
    Flush(FlushArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct FlushArgs {
    /// Delete the ticket catalog
    #[arg(long)]
    tickets: bool,
    /// Delete the check-in log
    #[arg(long)]
    checkins: bool,
    /// Delete both
    #[arg(long)]
    all: bool,
}

impl FlushArgs {
    const fn scope(&self) -> FlushScope {
        if self.all {
            FlushScope::All
        } else if self.tickets {
            FlushScope::Tickets
        } else {
            FlushScope::CheckIns
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatecheck=info,gatecheck_station=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(database_url = %config.database_url, sync = config.sync.is_some(), "configuration loaded");

    let context = AppContext::open(&config)
        .await
        .context("Failed to start station")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(context, &config).await,
        Command::Sync => {
            let Some(client) = &context.sync else {
                bail!("Sync is not configured (set GATECHECK_SYNC_URL)");
            };
            let report = client.sync().await?;
            println!(
                "Synced from cursor {}: {} fetched, {} new, {} unchanged",
                report.cursor, report.fetched, report.inserted, report.unchanged
            );
            Ok(())
        }
        Command::Stats => {
            let totals = context.tickets.totals().await?;
            println!("Sold: {}  Used: {}", totals.sold, totals.used);
            Ok(())
        }
        Command::Flush(args) => {
            let scope = args.scope();
            let removed = context.tickets.flush(scope).await?;
            info!(?scope, removed, "flushed");
            println!("Removed {removed} rows");
            Ok(())
        }
    }
}

async fn run(context: AppContext, config: &Config) -> Result<()> {
    let refresher = match (&context.sync, &config.sync) {
        (Some(client), Some(settings)) => Some(Arc::clone(client).spawn_periodic(settings.interval)),
        _ => None,
    };

    let engine = CheckInEngine::new(context);
    let result = console::run(&engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;

    engine.shutdown().await;
    if let Some(refresher) = refresher {
        refresher.abort();
    }
    info!("station stopped");
    Ok(result?)
}
