mod checkout;
mod context;
mod discover;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use context::AppContext;

#[derive(Debug, Parser)]
#[command(name = "clipp")]
#[command(about = "Find coupon codes for a store and try them on a checkout page")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List configured stores and coupon sources
    Stores,
    /// Look up coupon codes for a store
    Find {
        /// Store id from the stores file (e.g. zalando)
        store: String,
        /// Bypass the cache and query every source again
        #[arg(long)]
        refresh: bool,
        /// Print the coupons as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enter a single code on a saved checkout page
    Apply {
        store: String,
        /// Saved HTML of the checkout page
        #[arg(long)]
        page: PathBuf,
        code: String,
    },
    /// Try several codes on a saved checkout page and report the best one
    Test {
        store: String,
        #[arg(long)]
        page: PathBuf,
        /// Codes to try; looked up from the sources when omitted
        codes: Vec<String>,
        /// Make the page accept CODE and take AMOUNT off the total
        #[arg(long = "simulate", value_name = "CODE=AMOUNT", value_parser = parse_simulated_code)]
        simulate: Vec<(String, Decimal)>,
        /// Order total to show when the page has none
        #[arg(long)]
        total: Option<Decimal>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the local coupon cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommands {
    /// Drop cached discovery and community results for a store
    Clear { store: String },
}

/// Parses `CODE=AMOUNT` for `--simulate`.
fn parse_simulated_code(raw: &str) -> Result<(String, Decimal), String> {
    let (code, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=AMOUNT, got '{raw}'"))?;
    let code = code.trim();
    if code.is_empty() {
        return Err(format!("missing code in '{raw}'"));
    }
    let amount = clipp_page::parse_amount(amount)
        .ok_or_else(|| format!("invalid amount in '{raw}'"))?;
    Ok((code.to_uppercase(), amount))
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = clipp_core::load_app_config()?;
    init_tracing(&config.log_level);

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("clipp: run `clipp --help` for available commands");
        return Ok(());
    };

    let ctx = AppContext::load(config)?;
    match command {
        Commands::Stores => {
            discover::run_stores(&ctx);
            Ok(())
        }
        Commands::Find {
            store,
            refresh,
            json,
        } => discover::run_find(&ctx, &store, refresh, json).await,
        Commands::Apply { store, page, code } => {
            checkout::run_apply(&ctx, &store, &page, &code).await
        }
        Commands::Test {
            store,
            page,
            codes,
            simulate,
            total,
            json,
        } => {
            let opts = checkout::TestOptions {
                codes,
                simulate,
                total,
                json,
            };
            checkout::run_test(&ctx, &store, &page, opts).await
        }
        Commands::Cache {
            command: CacheCommands::Clear { store },
        } => discover::run_cache_clear(&ctx, &store),
    }
}
