//! CLI command implementations

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::filter::{FilterResult, GuardVerdict};
use crate::pipeline::{Pipeline, PollCycle, Scheduler};

/// Run the poll scheduler until Ctrl-C
pub async fn start(config: &Config) -> Result<()> {
    info!("Starting migration scout...");
    info!(
        "Filters: min_liquidity={} max_fee={}% min_holders={} min_age={}min max_per_creator={}",
        config.filters.min_liquidity,
        config.filters.max_creator_fee,
        config.filters.min_holders,
        config.filters.block_new_coins_minutes,
        config.filters.max_coins_per_creator
    );

    let pipeline = Pipeline::from_config(config).context("Failed to initialize pipeline")?;
    let stats = pipeline.store().stats()?;
    info!(
        coins = stats.coins,
        security_checks = stats.security_checks,
        transactions = stats.transactions,
        db = %config.database.path,
        "Database opened"
    );

    let scheduler = Scheduler::new(
        Arc::new(pipeline) as Arc<dyn PollCycle>,
        config.scheduler.poll_interval(),
        config.scheduler.error_cooldown(),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, finishing current cycle"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_cancel.cancel();
    });

    let summary = scheduler.run(cancel).await;
    info!(
        "Shutdown complete after {} cycles ({} failed)",
        summary.cycles, summary.failures
    );

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Run the anomaly detector once over stored trades
pub async fn analyze(config: &Config) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to initialize pipeline")?;
    let aggregates = pipeline.store().aggregate_transactions()?;

    println!("\n=== TRANSACTION ANALYSIS ===\n");
    println!("Coins with trades: {}", aggregates.len());

    let outliers = pipeline.detector().detect(&aggregates);
    if outliers.is_empty() {
        println!("No anomalous trading patterns found.");
        return Ok(());
    }

    println!("\nOutliers:");
    for aggregate in aggregates
        .iter()
        .filter(|a| outliers.contains(&a.contract_address))
    {
        let symbol = pipeline
            .store()
            .get_coin(&aggregate.contract_address)?
            .map(|c| c.symbol)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {} ({})  txs={}  volume={:.4} ETH  avg_gas={:.2}",
            aggregate.contract_address, symbol, aggregate.tx_count, aggregate.total_volume, aggregate.avg_gas
        );
    }

    Ok(())
}

/// Evaluate one raw JSON record without persisting anything
pub async fn check(config: &Config, file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("Cannot read {}", file))?;
    let record: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", file))?;

    let pipeline = Pipeline::from_config(config).context("Failed to initialize pipeline")?;
    let verdict = pipeline.dry_run(&record, Utc::now()).await?;
    let coin = &verdict.coin;

    println!("\n=== RECORD CHECK ===\n");
    println!("Name:         {} ({})", coin.name, coin.symbol);
    println!("Contract:     {}", coin.contract_address);
    println!("Creator:      {}", coin.creator);
    println!("Migrated:     {}", coin.migration_time.to_rfc3339());
    println!("Liquidity:    {} ETH", coin.initial_liquidity);
    println!("Creator fee:  {}%", coin.creator_fee);
    println!("Holders:      {}", coin.holders);
    println!();
    println!(
        "Stored:       {}",
        if verdict.already_stored { "yes (would be skipped)" } else { "no" }
    );
    match &verdict.guard {
        GuardVerdict::Allowed => println!("Guard:        PASS"),
        GuardVerdict::Rejected(reason) => println!("Guard:        REJECT ({})", reason),
    }
    match &verdict.filter {
        FilterResult::Pass => println!("Filters:      PASS"),
        FilterResult::Filtered(reason) => println!("Filters:      FILTERED ({})", reason),
    }
    println!();
    println!(
        "Result:       {}",
        if verdict.would_accept() { "would be accepted" } else { "would be dropped" }
    );

    Ok(())
}
