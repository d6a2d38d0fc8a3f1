//! fxsignal CLI: analysis cycles, position monitoring, sizing and config checks.
//!
//! Commands:
//! - `scan` run one analysis cycle over the configured pairs, optionally
//!   confirming signals against the market and monitoring the entries
//! - `monitor` track a manually opened position until it closes
//! - `size` position size for an entry and stop
//! - `config check` load and validate a config file

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use fxsignal_core::data::{
    CalendarFeed, CandleSource, CircuitBreaker, CsvCandleSource, EventSource, MemoryEvents, PriceSource,
    SyntheticCandles, YahooProvider,
};
use fxsignal_core::domain::{CurrencyPair, TradeDirection};
use fxsignal_core::risk::{OpenPosition, PositionSizer, SLTPCalculator};
use fxsignal_core::BotConfig;
use fxsignal_runner::notify;
use fxsignal_runner::{
    CycleReport, PairOutcome, PollingVenue, PositionMonitor, Reaction, ReactionOutcome, Runner, Sources,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TOKEN_ENV: &str = "FXSIGNAL_TELEGRAM_TOKEN";
const SYNTHETIC_SEED: u64 = 42;

#[derive(Parser)]
#[command(name = "fxsignal", about = "fxsignal: forex signal composition bot")]
struct Cli {
    /// Log level filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one analysis cycle and print a summary.
    Scan {
        /// Path to a TOML config file. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pairs to scan (e.g. GBP/USD EUR/USD). Defaults to the configured pairs.
        #[arg(long, num_args = 1..)]
        pairs: Vec<String>,

        /// Offline mode: candles from CSV files, events from a JSON file.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Directory holding `<PAIR>_<TF>.csv` files (with --offline).
        #[arg(long, default_value = "data")]
        candles_dir: PathBuf,

        /// JSON file of economic events (with --offline).
        #[arg(long)]
        events: Option<PathBuf>,

        /// Use seeded synthetic candles instead of a provider.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Worker threads for the cycle. Uses the global pool when omitted.
        #[arg(long)]
        threads: Option<usize>,

        /// Send a cycle summary through the notifier as well.
        #[arg(long, default_value_t = false)]
        summary: bool,

        /// Print the full cycle report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Check each signal against the market, then monitor confirmed entries.
        #[arg(long, default_value_t = false)]
        confirm: bool,

        /// Seconds between monitor passes (with --confirm). Defaults to the configured interval.
        #[arg(long)]
        interval: Option<u64>,

        /// Stop monitoring after this many passes (with --confirm).
        #[arg(long)]
        iterations: Option<usize>,
    },
    /// Track a manual position, moving the stop and reporting exits.
    Monitor {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        pair: String,

        #[arg(long, value_enum)]
        direction: DirectionArg,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        stop: f64,

        /// Seconds between price checks. Defaults to the configured interval.
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many passes.
        #[arg(long)]
        iterations: Option<usize>,

        /// Use seeded synthetic prices instead of a provider.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Position size for an entry and stop under the configured risk.
    Size {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        pair: String,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        stop: f64,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate a config file, then print the effective values.
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DirectionArg {
    Long,
    Short,
}

impl From<DirectionArg> for TradeDirection {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Long => TradeDirection::Long,
            DirectionArg::Short => TradeDirection::Short,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Scan {
            config,
            pairs,
            offline,
            candles_dir,
            events,
            synthetic,
            threads,
            summary,
            json,
            confirm,
            interval,
            iterations,
        } => {
            let opts = ScanOptions {
                pairs,
                offline,
                candles_dir,
                events,
                synthetic,
                threads,
                summary,
                json,
                confirm,
                interval,
                iterations,
            };
            run_scan(&load_config(config.as_deref())?, opts)
        }
        Commands::Monitor {
            config,
            pair,
            direction,
            entry,
            stop,
            interval,
            iterations,
            synthetic,
        } => {
            let config = load_config(config.as_deref())?;
            let pair: CurrencyPair = pair.parse()?;
            run_monitor(&config, pair, direction.into(), entry, stop, interval, iterations, synthetic)
        }
        Commands::Size {
            config,
            pair,
            entry,
            stop,
        } => {
            let pair: CurrencyPair = pair.parse()?;
            run_size(&load_config(config.as_deref())?, &pair, entry, stop)
        }
        Commands::Config {
            action: ConfigAction::Check { config },
        } => run_config_check(config.as_deref()),
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

/// Config from file (or defaults), with the Telegram token taken from the
/// environment when set, validated once.
fn load_config(path: Option<&Path>) -> Result<BotConfig> {
    let mut config = match path {
        Some(p) => BotConfig::from_file(p)?,
        None => BotConfig::default(),
    };
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.is_empty() {
            config.telegram.bot_token = Some(token);
        }
    }
    config.validate()?;
    Ok(config)
}

struct ScanOptions {
    pairs: Vec<String>,
    offline: bool,
    candles_dir: PathBuf,
    events: Option<PathBuf>,
    synthetic: bool,
    threads: Option<usize>,
    summary: bool,
    json: bool,
    confirm: bool,
    interval: Option<u64>,
    iterations: Option<usize>,
}

fn run_scan(config: &BotConfig, opts: ScanOptions) -> Result<()> {
    if opts.offline && opts.synthetic {
        bail!("--offline and --synthetic are mutually exclusive");
    }

    let pairs = if opts.pairs.is_empty() {
        config.pairs.clone()
    } else {
        opts.pairs
            .iter()
            .map(|p| p.parse::<CurrencyPair>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let now = Utc::now();
    let breaker = Arc::new(CircuitBreaker::new(
        Duration::from_secs(config.data.breaker_cooldown_secs),
        config.data.max_retries.max(1),
    ));

    // Each branch owns its sources; the runner borrows them.
    let events: Box<dyn EventSource> = if opts.offline || opts.synthetic {
        match &opts.events {
            Some(path) => Box::new(MemoryEvents::from_json_file(path)?),
            None => {
                tracing::warn!("no --events file given, fundamentals will see no events");
                Box::new(MemoryEvents::new(Vec::new()))
            }
        }
    } else {
        Box::new(CalendarFeed::new(&config.data, Arc::clone(&breaker))?)
    };

    let provider;
    let csv;
    let synthetic;
    let (candles, prices): (&dyn CandleSource, &dyn PriceSource) = if opts.synthetic {
        synthetic = SyntheticCandles::new(SYNTHETIC_SEED).ending_at(now);
        (&synthetic, &synthetic)
    } else if opts.offline {
        csv = CsvCandleSource::new(&opts.candles_dir);
        offline_source(&csv)
    } else {
        provider = YahooProvider::new(&config.data, Arc::clone(&breaker))?;
        (&provider, &provider)
    };

    let notifier = notify::from_config(&config.telegram, &config.data)?;
    let sources = Sources {
        events: events.as_ref(),
        candles,
        prices,
    };
    let mut runner = Runner::new(config, sources, notifier.as_ref())
        .with_summary(opts.summary)
        .with_breaker(Arc::clone(&breaker));
    if let Some(threads) = opts.threads {
        runner = runner.with_threads(threads);
    }

    let mut report = runner.run_cycle_at(&pairs, now)?;

    let venue = PollingVenue::new(prices);
    let monitor = PositionMonitor::new(config, &venue, notifier.as_ref()).with_candles(candles);
    let reactions = if opts.confirm {
        runner.confirm_signals(&mut report, &monitor, Utc::now())
    } else {
        Vec::new()
    };

    if opts.json {
        let out = if opts.confirm {
            serde_json::json!({ "report": report, "reactions": reactions })
        } else {
            serde_json::to_value(&report)?
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(&report, &reactions);
    }

    if !monitor.is_empty() {
        let interval = Duration::from_secs(opts.interval.unwrap_or(config.monitor.interval_secs));
        let shutdown = AtomicBool::new(false);
        let passes = monitor.run(&shutdown, interval, opts.iterations);
        println!("Monitor stopped after {passes} passes, {} positions still open", monitor.len());
    }
    Ok(())
}

fn print_report(report: &CycleReport, reactions: &[Reaction]) {
    println!(
        "Cycle {}: {} pairs, {} signals, {} failures",
        report.started_at.format("%Y-%m-%d %H:%M UTC"),
        report.outcomes.len(),
        report.signal_count(),
        report.failure_count()
    );
    for outcome in &report.outcomes {
        match outcome {
            PairOutcome::Signal(enriched) => {
                let s = &enriched.signal;
                println!(
                    "  {:<8} {} {} entry {:.5} stop {:.5} TP3 {:.5} lots {:.2} [{}]",
                    s.pair.to_string(),
                    s.direction,
                    s.strength,
                    enriched.levels.entry_price,
                    enriched.levels.stop_loss,
                    enriched.levels.take_profit_3,
                    enriched.position.position_size_lots,
                    s.id
                );
            }
            PairOutcome::NoSignal { pair, reason } => println!("  {:<8} no signal: {reason}", pair.to_string()),
            PairOutcome::Failed { pair, error, retryable } => {
                let hint = if *retryable { " (retryable)" } else { "" };
                println!("  {:<8} failed: {error}{hint}", pair.to_string());
            }
        }
    }
    for reaction in reactions {
        let opened = match &reaction.position_id {
            Some(id) => format!(", tracking {id}"),
            None => String::new(),
        };
        let what = match reaction.outcome {
            ReactionOutcome::Confirmed { price } => format!("confirmed at {price:.5}"),
            ReactionOutcome::Cancelled { price, adverse_pct } => {
                format!("cancelled at {price:.5} ({adverse_pct:.2}% adverse)")
            }
            ReactionOutcome::Expired => "expired".to_string(),
        };
        println!("  {:<8} {what}{opened}", reaction.pair.to_string());
    }
    if report.notify_failures > 0 {
        println!("  {} notifications could not be delivered", report.notify_failures);
    }
}

/// CSV files carry no live quote, so the last close stands in for the price.
fn offline_source(csv: &CsvCandleSource) -> (&dyn CandleSource, &dyn PriceSource) {
    (csv, csv)
}

#[allow(clippy::too_many_arguments)]
fn run_monitor(
    config: &BotConfig,
    pair: CurrencyPair,
    direction: TradeDirection,
    entry: f64,
    stop: f64,
    interval: Option<u64>,
    iterations: Option<usize>,
    synthetic: bool,
) -> Result<()> {
    let levels = SLTPCalculator::new(&config.risk).calculate(&pair, direction, entry, &[], Some(stop))?;
    let size = PositionSizer::new(&config.risk).size_validated(&pair, entry, levels.stop_loss)?;
    let now = Utc::now();

    let position = OpenPosition::new(
        format!("manual-{}-{}", pair.compact(), now.timestamp()),
        pair.clone(),
        direction,
        entry,
        levels.stop_loss,
        levels.take_profits(),
        size.position_size_lots,
        now,
    );

    let breaker = Arc::new(CircuitBreaker::new(
        Duration::from_secs(config.data.breaker_cooldown_secs),
        config.data.max_retries.max(1),
    ));
    let provider;
    let synthetic_source;
    let (candles, prices): (&dyn CandleSource, &dyn PriceSource) = if synthetic {
        synthetic_source = SyntheticCandles::new(SYNTHETIC_SEED);
        (&synthetic_source, &synthetic_source)
    } else {
        provider = YahooProvider::new(&config.data, breaker)?;
        (&provider, &provider)
    };

    let notifier = notify::from_config(&config.telegram, &config.data)?;
    let venue = PollingVenue::new(prices);
    let monitor = PositionMonitor::new(config, &venue, notifier.as_ref()).with_candles(candles);
    let id = monitor.open(position);

    println!(
        "Monitoring {id}: {direction} {pair} entry {entry:.5} stop {:.5} TPs {:.5} / {:.5} / {:.5}, {:.2} lots",
        levels.stop_loss,
        levels.take_profit_1,
        levels.take_profit_2,
        levels.take_profit_3,
        size.position_size_lots
    );

    let interval = Duration::from_secs(interval.unwrap_or(config.monitor.interval_secs));
    let shutdown = AtomicBool::new(false);
    let passes = monitor.run(&shutdown, interval, iterations);

    match monitor.positions().first() {
        Some(open) => println!(
            "Stopped after {passes} passes; position still open, stop {:.5} ({:?})",
            open.current_stop(),
            open.phase
        ),
        None => println!("Position closed after {passes} passes"),
    }
    Ok(())
}

fn run_size(config: &BotConfig, pair: &CurrencyPair, entry: f64, stop: f64) -> Result<()> {
    let size = PositionSizer::new(&config.risk).size_validated(pair, entry, stop)?;
    println!("Pair:          {}", size.pair);
    println!("Entry:         {:.5}", size.entry_price);
    println!("Stop:          {:.5} ({:.1} pips)", size.stop_loss, size.stop_distance_pips);
    println!("Pip value:     {:.2} per lot", size.pip_value_per_lot);
    println!(
        "Size:          {:.2} lots ({:.0} units){}",
        size.position_size_lots,
        size.position_size_units,
        if size.capped_by_leverage { ", capped by leverage" } else { "" }
    );
    println!(
        "Risk:          {:.2} ({:.2}% of balance, target {:.2})",
        size.risk_amount,
        size.risk_pct_of(config.risk.account_balance),
        size.target_risk_amount
    );
    Ok(())
}

fn run_config_check(path: Option<&Path>) -> Result<()> {
    let config = load_config(path).with_context(|| match path {
        Some(p) => format!("config {} is invalid", p.display()),
        None => "default config is invalid".to_string(),
    })?;
    let pairs: Vec<String> = config.pairs.iter().map(|p| p.to_string()).collect();
    println!("Config OK");
    println!("  pairs:        {}", pairs.join(", "));
    println!(
        "  risk:         {}% of {:.2}, leverage {}:1, min R {}",
        config.risk.risk_percentage, config.risk.account_balance, config.risk.leverage, config.risk.min_risk_reward
    );
    println!(
        "  trend:        EMA {}/{}",
        config.trend.fast_period, config.trend.slow_period
    );
    println!(
        "  telegram:     {}",
        if config.telegram.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
