use anyhow::{Context, bail};
use myrvm_cache::{CacheService, CacheStore, ScanPrefix};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use tracing::info;

use crate::cli::new_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Warm,
    Clear,
    Stats,
    ClearPrefix,
}

impl CacheAction {
    pub const AVAILABLE: &'static str = "warm, clear, stats, clear-prefix";
}

impl FromStr for CacheAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warm" => Ok(Self::Warm),
            "clear" => Ok(Self::Clear),
            "stats" => Ok(Self::Stats),
            "clear-prefix" => Ok(Self::ClearPrefix),
            other => Err(format!(
                "Unknown action: {}\nAvailable actions: {}",
                other,
                Self::AVAILABLE
            )),
        }
    }
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warm => "warm",
            Self::Clear => "clear",
            Self::Stats => "stats",
            Self::ClearPrefix => "clear-prefix",
        })
    }
}

/// Runs `cache <action>`.
pub async fn run<S>(
    cache: &CacheService<S>,
    action: CacheAction,
    prefix: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    match action {
        CacheAction::Warm => warm(cache, out).await,
        CacheAction::Clear => clear(cache, out).await,
        CacheAction::Stats => stats(cache, out).await,
        CacheAction::ClearPrefix => {
            let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
                bail!("Prefix is required for clear-prefix action\nUsage: myrvm-cli cache clear-prefix --prefix=rvm");
            };
            clear_prefix(cache, prefix, out).await
        }
    }
}

async fn warm<S>(cache: &CacheService<S>, out: &mut impl Write) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    writeln!(out, "Warming up cache...")?;

    let results = cache.warm_up().await;
    writeln!(out, "Cache warm up completed:")?;
    for (name, ok) in &results {
        writeln!(out, "  - {}: {}", name, if *ok { "Success" } else { "Failed" })?;
    }

    info!(?results, "Cache warm up finished");
    Ok(())
}

async fn clear<S>(cache: &CacheService<S>, out: &mut impl Write) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    writeln!(out, "Clearing cache...")?;
    let removed = cache.flush().await.context("Cache clear failed")?;
    writeln!(out, "Cache cleared successfully! ({} keys removed)", removed)?;
    Ok(())
}

async fn clear_prefix<S>(cache: &CacheService<S>, prefix: &str, out: &mut impl Write) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    writeln!(out, "Clearing cache with prefix: {}", prefix)?;
    let removed = cache
        .clear_by_prefix(prefix)
        .await
        .with_context(|| format!("Failed to clear cache with prefix '{}'", prefix))?;
    writeln!(
        out,
        "Cache with prefix '{}' cleared successfully! ({} keys removed)",
        prefix, removed
    )?;
    Ok(())
}

async fn stats<S>(cache: &CacheService<S>, out: &mut impl Write) -> anyhow::Result<()>
where
    S: CacheStore + ScanPrefix,
{
    writeln!(out, "Cache Statistics:")?;

    let stats = cache.get_stats().await;
    if stats.is_empty() {
        writeln!(out, "No cache statistics available")?;
        return Ok(());
    }

    let value = |key: &str| stats.get(key).cloned().unwrap_or_else(|| "N/A".to_string());
    let mut table = new_table(&["Metric", "Value"]);
    table
        .add_row(vec!["Used Memory".to_string(), value("used_memory")])
        .add_row(vec!["Peak Memory".to_string(), value("used_memory_peak")])
        .add_row(vec!["Connected Clients".to_string(), value("connected_clients")])
        .add_row(vec!["Total Commands".to_string(), value("total_commands_processed")])
        .add_row(vec!["Cache Hits".to_string(), value("keyspace_hits")])
        .add_row(vec!["Cache Misses".to_string(), value("keyspace_misses")])
        .add_row(vec!["Hit Rate".to_string(), format!("{}%", value("hit_rate"))]);
    writeln!(out, "{table}")?;
    Ok(())
}
