//! Lilycast CLI — forecasts, market snapshots and cache management.
//!
//! Commands:
//! - `forecast`: train on the merged series and project the next closes
//! - `quote`: normalized company page fields
//! - `prices`: the latest price board, or one row of it
//! - `indices`: DSEX, DSES and DS30
//! - `history`: merged daily bars over a named range
//! - `cache status`: cached entries with age and freshness
//! - `cache clear`: remove every cached entry

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use lilycast_core::cache::{Origin, Served};
use lilycast_core::data::{ContentSource, HttpContentSource};
use lilycast_runner::{
    spawn_forecast, CacheAdmin, CacheTtls, ForecastOutcome, Forecaster, HistoryRange, LilycastConfig,
    MarketService,
};

#[derive(Parser)]
#[command(
    name = "lilycast",
    about = "Lilycast CLI — exchange quotes, price history and closing price forecasts"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted or missing.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory, overriding the config.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Historical archive CSV, overriding the config.
    #[arg(long, global = true)]
    archive: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the recurrent model on a symbol's closes and forecast ahead.
    Forecast {
        /// Trading code (e.g., GP, BATBC).
        symbol: String,

        /// Treat this date (YYYY-MM-DD) as today. Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Number of future days to forecast, overriding the config.
        #[arg(long)]
        days: Option<usize>,
    },
    /// Show normalized company page fields.
    Quote {
        /// Trading code.
        symbol: String,
    },
    /// Show the latest price board.
    Prices {
        /// Only show this trading code.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Show the headline market indices.
    Indices,
    /// Show merged daily bars for a symbol.
    History {
        /// Trading code.
        symbol: String,

        /// One of 1D, 5D, 1M, 6M, 1Y, 2Y.
        #[arg(long, default_value = "1Y")]
        range: HistoryRange,

        /// Treat this date (YYYY-MM-DD) as today. Defaults to today.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached entries with their age and freshness.
    Status,
    /// Remove every cached entry.
    Clear,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = LilycastConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = dir;
    }
    if let Some(path) = cli.archive {
        config.archive.path = Some(path);
    }
    tracing::debug!(config = ?cli.config, cache_dir = %config.cache.dir.display(), "configuration loaded");

    match cli.command {
        Commands::Forecast { symbol, as_of, days } => run_forecast(config, &symbol, as_of, days, cli.json),
        Commands::Quote { symbol } => run_quote(&config, &symbol, cli.json),
        Commands::Prices { symbol } => run_prices(&config, symbol.as_deref(), cli.json),
        Commands::Indices => run_indices(&config, cli.json),
        Commands::History { symbol, range, as_of } => run_history(&config, &symbol, range, as_of, cli.json),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config, cli.json),
            CacheAction::Clear => run_cache_clear(&config),
        },
    }
}

/// Logs go to stderr so stdout stays clean for JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,lilycast=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_source(config: &LilycastConfig) -> Result<Arc<dyn ContentSource>> {
    let source = HttpContentSource::with_base_url(config.source.base_url.clone())?
        .with_retries(config.source.max_retries, Duration::from_millis(config.source.retry_delay_ms));
    Ok(Arc::new(source))
}

fn market_service(config: &LilycastConfig) -> Result<MarketService> {
    Ok(MarketService::persistent(
        build_source(config)?,
        &config.cache.dir,
        CacheTtls::from(&config.cache),
    ))
}

fn parse_as_of(as_of: Option<&str>) -> Result<NaiveDate> {
    match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'")),
        None => Ok(chrono::Utc::now().date_naive()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn origin_note<P>(served: &Served<P>) -> String {
    match (served.origin, served.fetched_at) {
        (Origin::Refreshed, _) => "fresh from the exchange".into(),
        (Origin::Cache, Some(at)) => format!("cached at {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        (Origin::Stale, Some(at)) => format!("STALE, last fetched {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        (Origin::Empty, _) => "unavailable".into(),
        (_, None) => "unknown age".into(),
    }
}

fn run_forecast(
    mut config: LilycastConfig,
    symbol: &str,
    as_of: Option<String>,
    days: Option<usize>,
    json: bool,
) -> Result<()> {
    if let Some(days) = days {
        config.forecast.prediction_days = days;
    }
    config.validate()?;
    let as_of = parse_as_of(as_of.as_deref())?;
    let timeout = Duration::from_secs(config.forecast.timeout_secs);

    let forecaster = Arc::new(Forecaster::new(build_source(&config)?, config));
    let outcome = spawn_forecast(forecaster, symbol, as_of).wait(timeout);

    if json {
        print_json(&outcome)?;
    } else {
        print_forecast(&outcome);
    }

    if !outcome.is_ready() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_forecast(outcome: &ForecastOutcome) {
    match outcome {
        ForecastOutcome::Ready(report) => {
            println!("=== Forecast: {} ===", report.symbol);
            println!("Rows:         {}", report.rows);
            if let Some(last) = report.actual.last() {
                println!("Last close:   {:.2} on {}", last.value, last.date);
            }
            println!("Trend:        {}", report.trend);
            if let Some(loss) = report.final_loss {
                println!("Final loss:   {loss:.6}");
            }
            println!("Dataset:      {}", &report.dataset_hash[..report.dataset_hash.len().min(12)]);
            if let Some(merge) = &report.merge {
                println!(
                    "Merged:       {} bars in, {} overridden, {} incomplete",
                    merge.input_bars, merge.overridden, merge.incomplete
                );
            }
            for source in &report.sources {
                match &source.error {
                    Some(e) => println!("Source:       {:<16} failed: {e}", source.name),
                    None => println!("Source:       {:<16} {} bars", source.name, source.bars),
                }
            }
            println!();
            println!("{:<12} {:>10}", "Date", "Forecast");
            println!("{}", "-".repeat(23));
            for point in report.future() {
                println!("{:<12} {:>10.2}", point.date.to_string(), point.value);
            }
        }
        ForecastOutcome::Unavailable { symbol, reason, rows, .. } => {
            eprintln!("Forecast unavailable for {symbol} ({rows} rows): {reason}");
        }
    }
}

fn run_quote(config: &LilycastConfig, symbol: &str, json: bool) -> Result<()> {
    let service = market_service(config)?;
    let served = service.company_details(symbol);

    if json {
        return print_json(&served);
    }
    let Some(quote) = &served.payload else {
        eprintln!("No company data for {}", symbol.trim().to_uppercase());
        std::process::exit(1);
    };

    println!("=== {} ({}) ===", quote.symbol, origin_note(&served));
    for metric in quote.metrics.iter() {
        let value = match (metric.value.as_number(), metric.value.as_text()) {
            (Some(n), _) => format!("{n}"),
            (None, Some(s)) => s.to_string(),
            (None, None) => String::new(),
        };
        println!("{:<36} {}", metric.field.to_string(), value);
    }
    Ok(())
}

fn run_prices(config: &LilycastConfig, symbol: Option<&str>, json: bool) -> Result<()> {
    let service = market_service(config)?;
    let served = service.latest_prices();
    let wanted = symbol.map(|s| s.trim().to_uppercase());
    let rows: Vec<_> = served
        .payload
        .iter()
        .filter(|row| wanted.as_ref().map_or(true, |w| &row.symbol == w))
        .collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        match wanted {
            Some(w) => eprintln!("{w} is not on the price board"),
            None => eprintln!("Price board unavailable"),
        }
        std::process::exit(1);
    }

    println!("Price board ({})", origin_note(&served));
    println!(
        "{:<14} {:>10} {:>10} {:>10} {:>10} {:>8} {:>12}",
        "Symbol", "LTP", "High", "Low", "YCP", "Chg%", "Volume"
    );
    println!("{}", "-".repeat(80));
    for row in rows {
        println!(
            "{:<14} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>7.2}% {:>12}",
            row.symbol, row.ltp, row.high, row.low, row.ycp, row.percent_change, row.volume
        );
    }
    Ok(())
}

fn run_indices(config: &LilycastConfig, json: bool) -> Result<()> {
    let service = market_service(config)?;
    let served = service.indices();

    if json {
        return print_json(&served);
    }
    if served.payload.is_empty() {
        eprintln!("Index snapshot unavailable");
        std::process::exit(1);
    }

    println!("Indices ({})", origin_note(&served));
    println!("{:<8} {:>12} {:>10} {:>8}", "Index", "Value", "Change", "Chg%");
    println!("{}", "-".repeat(41));
    for index in &served.payload {
        println!(
            "{:<8} {:>12.2} {:>10.2} {:>7.2}%",
            index.name, index.value, index.change, index.percent_change
        );
    }
    Ok(())
}

fn run_history(
    config: &LilycastConfig,
    symbol: &str,
    range: HistoryRange,
    as_of: Option<String>,
    json: bool,
) -> Result<()> {
    let service = market_service(config)?;
    let today = parse_as_of(as_of.as_deref())?;
    let series = service.history(symbol, range, today);

    if json {
        return print_json(&series);
    }
    if series.is_empty() {
        eprintln!("No history for {} over {range}", symbol.trim().to_uppercase());
        std::process::exit(1);
    }

    println!("=== {} {range} ({} bars) ===", symbol.trim().to_uppercase(), series.len());
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>12}",
        "Date", "Open", "High", "Low", "Close", "Volume"
    );
    println!("{}", "-".repeat(69));
    for bar in series.bars() {
        println!(
            "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12.0}",
            bar.date.to_string(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
    }
    Ok(())
}

fn run_cache_status(config: &LilycastConfig, json: bool) -> Result<()> {
    let admin = CacheAdmin::from_config(&config.cache);
    let status = admin.status(chrono::Utc::now())?;

    if json {
        return print_json(&status);
    }
    if status.is_empty() {
        println!("Cache is empty: {}", admin.dir().display());
        return Ok(());
    }

    println!("Cache: {}", admin.dir().display());
    println!("Entries: {}", status.len());
    println!();
    println!("{:<24} {:<22} {:>10} {:>10} {:<6}", "Key", "Fetched", "Age (s)", "TTL (s)", "Fresh");
    println!("{}", "-".repeat(76));
    for entry in &status {
        println!(
            "{:<24} {:<22} {:>10} {:>10} {:<6}",
            entry.key,
            entry.fetched_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.age_secs,
            entry.ttl_secs,
            if entry.fresh { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn run_cache_clear(config: &LilycastConfig) -> Result<()> {
    let admin = CacheAdmin::from_config(&config.cache);
    let removed = admin.clear()?;
    println!("Removed {removed} entries from {}", admin.dir().display());
    Ok(())
}
