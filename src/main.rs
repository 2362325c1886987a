//! Factor Vault Yields - leverage vault listing for the yield platform
//!
//! Run with: cargo run
//!
//! One refresh:
//! - Subgraph pair balances + DefiLlama prices → net TVL per vault pair
//! - Aave V3 / Compound V3 / Lodestar rates → base APY per vault pair
//! - One record per registry vault (JSON with `--json`)

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod adapters;
mod config;
mod error;
mod pools;
mod pricing;
mod refresh;
mod registry;
mod subgraph;
mod tvl;

use config::{Config, PoolSnapshotLog};
use pools::{build_legacy_records, PoolRecord};
use registry::VaultRegistry;

#[derive(Debug, Parser)]
#[command(name = "factor-vault-yields", about = "Factor leverage vault TVL and base APY listing")]
struct Args {
    /// TOML config file (defaults to environment / .env)
    #[arg(long)]
    config: Option<String>,

    /// Vault registry TOML (defaults to the embedded registry)
    #[arg(long)]
    registry: Option<String>,

    /// Refresh every `refresh_interval_secs` until interrupted
    #[arg(long)]
    watch: bool,

    /// Print records as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Emit the legacy zero-yield listing (no network access)
    #[arg(long)]
    legacy: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 📈 FACTOR VAULT YIELDS - Leverage Vault Listing").cyan().bold()
    );
    println!(
        "{}",
        style("    Subgraph TVL | Aave V3 | Compound V3 | Lodestar").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn load_registry(config: &Config) -> Result<VaultRegistry> {
    match &config.vault_registry_path {
        Some(path) => VaultRegistry::from_file(path),
        None => VaultRegistry::embedded(),
    }
}

fn print_records(records: &[PoolRecord]) {
    println!();
    for (i, record) in records.iter().enumerate() {
        let tvl = if record.tvl_usd < 0.0 {
            style(format!("${:>14.2}", record.tvl_usd)).red()
        } else {
            style(format!("${:>14.2}", record.tvl_usd)).green()
        };
        println!(
            "  {:>2}. {:<32} TVL {} | APY {:>7.3}%",
            i + 1,
            style(&record.symbol).cyan(),
            tvl,
            record.apy_base
        );
        println!("      {}", style(&record.pool).dim());
    }
    println!();

    let total: f64 = records.iter().map(|r| r.tvl_usd).sum();
    println!(
        "{} {} pools, net TVL ${:.2}",
        style("✓").green(),
        records.len(),
        total
    );
}

fn emit(records: &[PoolRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
    } else {
        print_records(records);
    }
    Ok(())
}

/// One refresh under the configured timeout
async fn run_once(config: &Config, registry: &VaultRegistry, show_spinner: bool) -> Result<Vec<PoolRecord>> {
    let spinner = if show_spinner {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
        pb.set_message(format!("Refreshing {} vaults...", registry.len()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let timeout = Duration::from_secs(config.refresh_timeout_secs);
    let result = tokio::time::timeout(timeout, refresh::apy(config, registry)).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let records = result.map_err(|_| eyre!("refresh timed out after {:?}", timeout))??;

    if config.snapshot_log {
        if let Err(e) = PoolSnapshotLog::new(records.clone()).append_to_file(&config.snapshot_log_path) {
            warn!("Failed to write snapshot log: {}", e);
        }
    }

    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("factor_vault_yields=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(path) = &args.registry {
        config.vault_registry_path = Some(path.clone());
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    if !args.json {
        print_banner();
        config.print_summary();
    }

    let registry = load_registry(&config)?;
    info!(
        "Loaded {} vaults across {} markets",
        registry.len(),
        registry.markets().len()
    );

    if args.legacy {
        let records = build_legacy_records(&config.legacy_pool_context(), &registry);
        return emit(&records, args.json);
    }

    if !args.watch {
        let records = run_once(&config, &registry, !args.json).await?;
        return emit(&records, args.json);
    }

    // Caller-side scheduling: every refresh starts from scratch
    let mut interval = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    loop {
        interval.tick().await;
        match run_once(&config, &registry, !args.json).await {
            Ok(records) => emit(&records, args.json)?,
            Err(e) => error!("Refresh failed: {:#}", e),
        }
    }
}
