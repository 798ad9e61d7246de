use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::pairtrade::{BacktestSummary, TradeRecord};

const RULE_WIDTH: usize = 60;

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Writes the summary as one pretty-printed JSON object.
pub fn write_summary_json<P: AsRef<Path>>(path: P, summary: &BacktestSummary) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(create_file(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)
        .with_context(|| format!("failed to write summary {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// One JSON object per closed trade, in close order.
pub fn write_trade_log<P: AsRef<Path>>(path: P, trades: &[TradeRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(create_file(path)?);
    for trade in trades {
        serde_json::to_writer(&mut writer, trade)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn format_summary(summary: &BacktestSummary, initial_capital: f64) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let hedge = summary
        .hedge_ratio
        .map(|h| format!("{:.4}", h))
        .unwrap_or_else(|| "n/a".to_string());
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "BACKTEST RESULTS");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Total Trades:      {}", summary.total_trades);
    let _ = writeln!(out, "Winning Trades:    {}", summary.winning_trades);
    let _ = writeln!(out, "Win Rate:          {:.2}%", summary.win_rate * 100.0);
    let _ = writeln!(out, "Total P&L:         ${:.2}", summary.total_pnl);
    let _ = writeln!(out, "Avg Trade P&L:     ${:.2}", summary.avg_trade);
    let _ = writeln!(out, "Initial Capital:   ${:.2}", initial_capital);
    let _ = writeln!(out, "Final Capital:     ${:.2}", summary.final_capital);
    let _ = writeln!(out, "Return:            {:.2}%", summary.return_pct);
    let _ = writeln!(out, "Sharpe Ratio:      {:.3}", summary.sharpe_ratio);
    let _ = writeln!(out, "Max Drawdown:      {:.2}%", summary.max_drawdown * 100.0);
    let _ = writeln!(out, "Hedge Ratio:       {}", hedge);
    let _ = write!(out, "{}", rule);
    out
}
