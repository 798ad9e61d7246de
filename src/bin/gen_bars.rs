use anyhow::{Context, Result};
use pairbot::config::PairTradeConfig;
use pairbot::pairtrade::LegSymbols;
use pairbot::ports::replay_feed::write_bars_jsonl;
use pairbot::ports::synthetic::{generate, SyntheticPairParams};
use std::env;
use std::fs::File;
use std::io::{self, BufWriter};

// Usage: gen-bars [OUTPUT.jsonl]
// Days, seed, bars per day and symbols come from the usual config sources.
fn main() -> Result<()> {
    env_logger::init();
    let cfg = PairTradeConfig::from_env_or_yaml().context("invalid pair trade config")?;
    let params = SyntheticPairParams {
        days: cfg.synthetic_days,
        bars_per_day: cfg.bars_per_day,
        seed: cfg.synthetic_seed,
        ..SyntheticPairParams::default()
    };
    let bars = generate(&params);
    let symbols = LegSymbols {
        a: &cfg.symbol_a,
        b: &cfg.symbol_b,
    };

    match env::args().nth(1) {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("failed to create {}", path))?;
            write_bars_jsonl(BufWriter::new(file), &bars, symbols)?;
            log::info!("wrote {} bars to {}", bars.len(), path);
        }
        None => {
            let stdout = io::stdout();
            write_bars_jsonl(BufWriter::new(stdout.lock()), &bars, symbols)?;
        }
    }
    Ok(())
}
