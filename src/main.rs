use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use env_logger::Builder;
use log::LevelFilter;
use pairbot::config::{PairTradeConfig, RunMode};
use pairbot::pairtrade::{Bar, LegSymbols, PairTradeEngine};
use pairbot::ports::replay_feed::{BarRecord, BarReplay};
use pairbot::ports::synthetic::{self, SyntheticPairParams};
use pairbot::report;
use pairbot::runner;
use pairbot::trade::execution::order_sink::{DryRunSink, OrderSink};
use std::env;
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const LIVE_CHANNEL_CAPACITY: usize = 1024;

fn init_logger() {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    let offset = FixedOffset::east_opt(offset_seconds).unwrap_or_else(|| Utc.fix());
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();
}

fn load_bars(cfg: &PairTradeConfig) -> Result<Vec<Bar>> {
    let symbols = LegSymbols {
        a: &cfg.symbol_a,
        b: &cfg.symbol_b,
    };
    match &cfg.backtest_file {
        Some(path) => {
            let replay = BarReplay::from_path(path, symbols)?;
            log::info!(
                "[BACKTEST] loaded {} bars from {} ({} skipped)",
                replay.len(),
                path,
                replay.skipped()
            );
            Ok(replay.collect())
        }
        None => {
            log::info!(
                "[BACKTEST] no BACKTEST_FILE set, generating {} days of synthetic bars (seed {})",
                cfg.synthetic_days,
                cfg.synthetic_seed
            );
            Ok(synthetic::generate(&SyntheticPairParams {
                days: cfg.synthetic_days,
                bars_per_day: cfg.bars_per_day,
                seed: cfg.synthetic_seed,
                ..SyntheticPairParams::default()
            }))
        }
    }
}

fn write_reports(
    cfg: &PairTradeConfig,
    summary: &pairbot::pairtrade::BacktestSummary,
    trades: &[pairbot::pairtrade::TradeRecord],
) -> Result<()> {
    println!("{}", report::format_summary(summary, cfg.initial_capital));
    if let Some(path) = &cfg.summary_file {
        report::write_summary_json(path, summary)?;
        log::info!("[REPORT] summary saved to {}", path);
    }
    if let Some(path) = &cfg.trade_log_file {
        report::write_trade_log(path, trades)?;
        log::info!("[REPORT] trade log saved to {} ({} trades)", path, trades.len());
    }
    Ok(())
}

fn run_backtest_mode(cfg: &PairTradeConfig, engine: &mut PairTradeEngine) -> Result<()> {
    let bars = load_bars(cfg)?;
    let report = runner::run_backtest(engine, bars);
    write_reports(cfg, &report.summary, &report.trades)
}

async fn run_live_mode(cfg: &PairTradeConfig, engine: &mut PairTradeEngine) -> Result<()> {
    if !cfg.dry_run {
        log::warn!("[LIVE] no order route is configured; intents will only be logged");
    }
    let (tx, rx) = mpsc::channel::<Bar>(LIVE_CHANNEL_CAPACITY);
    let symbol_a = cfg.symbol_a.clone();
    let symbol_b = cfg.symbol_b.clone();
    let reader = tokio::spawn(async move {
        let symbols = LegSymbols {
            a: &symbol_a,
            b: &symbol_b,
        };
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("[LIVE] interrupted, closing feed");
                    break;
                }
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    log::error!("[LIVE] failed to read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let record: BarRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("[LIVE] malformed bar '{}': {}", line, e);
                    continue;
                }
            };
            if let Some(bar) = record.to_bar(symbols) {
                if tx.send(bar).await.is_err() {
                    break;
                }
            }
        }
    });

    let sink: Box<dyn OrderSink> = Box::new(DryRunSink);
    let stats = runner::run_live(engine, rx, sink.as_ref()).await;
    reader.await.context("stdin reader task failed")?;
    log::info!(
        "[LIVE] processed {} bars ({} rejected)",
        stats.bars,
        stats.rejected
    );
    write_reports(cfg, &engine.summary(), engine.trades())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let git_hash = option_env!("PAIRBOT_GIT_HASH").unwrap_or("unknown");
    log::info!("pairbot git: {}", git_hash);
    let cfg = PairTradeConfig::from_env_or_yaml().context("invalid pair trade config")?;
    let mut engine =
        PairTradeEngine::new(cfg.clone()).context("failed to initialize pair trade engine")?;
    log::info!(
        "[CONFIG] starting {:?} run for {}/{} (entry={} exit={} stop={} hedge_mode={:?})",
        cfg.run_mode,
        cfg.symbol_a,
        cfg.symbol_b,
        cfg.z_entry_threshold,
        cfg.z_exit_threshold,
        cfg.z_stop_loss,
        cfg.hedge_mode
    );
    match cfg.run_mode {
        RunMode::Backtest => run_backtest_mode(&cfg, &mut engine),
        RunMode::Live => run_live_mode(&cfg, &mut engine).await,
    }
}
