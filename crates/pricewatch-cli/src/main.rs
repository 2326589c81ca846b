mod budget;
mod check;
#[cfg(feature = "chromium")]
mod chromium;
mod items;
mod pg_store;
mod run;
mod wiring;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pricewatch")]
#[command(about = "Tiered, cost-aware product price extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract the current price of a single item
    Check {
        #[arg(long)]
        url: String,

        /// Item name, including any variant token (e.g. "Model X 60W")
        #[arg(long)]
        name: String,

        /// Stable item id; defaults to the URL
        #[arg(long)]
        item_id: Option<String>,

        /// Last known good price, used to validate the new one
        #[arg(long)]
        previous_price: Option<Decimal>,

        #[arg(long, requires = "previous_price")]
        currency: Option<String>,

        /// Category key for the default price range
        #[arg(long)]
        category: Option<String>,

        /// Keep per-tier detail in the result
        #[arg(long)]
        debug: bool,

        /// Use the in-memory store instead of Postgres
        #[arg(long)]
        no_db: bool,
    },
    /// Run every item in a YAML items file through the pipeline
    Batch {
        #[arg(long)]
        items: PathBuf,

        /// Concurrent workers; defaults to PRICEWATCH_WORKERS
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,

        /// Overall deadline; 0 disables it. Defaults to PRICEWATCH_BATCH_DEADLINE_SECS
        #[arg(long)]
        deadline_secs: Option<u64>,

        #[arg(long)]
        no_db: bool,
    },
    /// Show today's spend against the configured limits
    Budget,
    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = pricewatch_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(env = %config.env, "configuration loaded");

    match cli.command {
        Commands::Check {
            url,
            name,
            item_id,
            previous_price,
            currency,
            category,
            debug,
            no_db,
        } => {
            let request = check::build_request(
                &url,
                &name,
                item_id.as_deref(),
                previous_price,
                currency.as_deref(),
                category.as_deref(),
                debug,
            );
            check::run_check(&config, request, no_db).await
        }
        Commands::Batch {
            items,
            workers,
            deadline_secs,
            no_db,
        } => {
            let options = run::BatchOptions {
                items_path: items,
                workers: workers.map(usize::from),
                deadline_secs,
                no_db,
            };
            run::run_batch_command(&config, options).await
        }
        Commands::Budget => budget::run_budget(&config).await,
        Commands::Migrate => {
            let pool = pricewatch_db::connect_pool_from_config(&config).await?;
            let applied = pricewatch_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests;
