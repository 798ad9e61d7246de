use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs::File;
use std::num::{ParseFloatError, ParseIntError};
use std::path::Path;
use std::str::FromStr;

use crate::pairtrade::hedge::HedgeMode;

const DEFAULT_SYMBOL_A: &str = "BTCUSDT-PERP";
const DEFAULT_SYMBOL_B: &str = "ETHUSDT-PERP";
const DEFAULT_LOOKBACK_PERIOD: usize = 60;
const DEFAULT_ROLLING_WINDOW: usize = 20;
const DEFAULT_ENTRY_Z: f64 = 2.0;
const DEFAULT_EXIT_Z: f64 = 0.5;
const DEFAULT_STOP_LOSS_Z: f64 = 3.0;
const DEFAULT_POSITION_SIZE_USD: f64 = 1000.0;
const DEFAULT_BARS_PER_DAY: usize = 1440;
const DEFAULT_MIN_HEDGE_SAMPLES: usize = 100;
const DEFAULT_SLIPPAGE_RATE: f64 = 0.001;
const DEFAULT_INITIAL_CAPITAL: f64 = 50_000.0;
const DEFAULT_COINTEGRATION_P: f64 = 0.05;
const DEFAULT_HEDGE_REESTIMATE_BARS: u64 = 1440;
const DEFAULT_SYNTHETIC_DAYS: usize = 90;
const DEFAULT_SYNTHETIC_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Replay a bar file (or synthetic bars) and print a report.
    Backtest,
    /// Read JSONL bars from stdin as they arrive.
    Live,
}

impl FromStr for RunMode {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "backtest" => Ok(RunMode::Backtest),
            "live" => Ok(RunMode::Live),
            _ => Err(()),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ParseIntError(ParseIntError),
    ParseFloatError(ParseFloatError),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ParseIntError(e) => write!(f, "Parse int error: {}", e),
            ConfigError::ParseFloatError(e) => write!(f, "Parse float error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ParseIntError> for ConfigError {
    fn from(err: ParseIntError) -> ConfigError {
        ConfigError::ParseIntError(err)
    }
}

impl From<ParseFloatError> for ConfigError {
    fn from(err: ParseFloatError) -> ConfigError {
        ConfigError::ParseFloatError(err)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct PairTradeYaml {
    symbol_a: Option<String>,
    symbol_b: Option<String>,
    lookback_period: Option<usize>,
    rolling_window: Option<usize>,
    z_entry_threshold: Option<f64>,
    z_exit_threshold: Option<f64>,
    z_stop_loss: Option<f64>,
    position_size_usd: Option<f64>,
    bars_per_day: Option<usize>,
    min_hedge_samples: Option<usize>,
    slippage_rate: Option<f64>,
    initial_capital: Option<f64>,
    cointegration_p_threshold: Option<f64>,
    hedge_mode: Option<HedgeMode>,
    hedge_reestimate_bars: Option<u64>,
    emit_exit_intents: Option<bool>,
    run_mode: Option<String>,
    dry_run: Option<bool>,
    backtest_file: Option<String>,
    summary_file: Option<String>,
    trade_log_file: Option<String>,
    synthetic_days: Option<usize>,
    synthetic_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PairTradeConfig {
    pub symbol_a: String,
    pub symbol_b: String,
    /// Days of price history retained per leg.
    pub lookback_period: usize,
    /// Days of spread history used for the z-score.
    pub rolling_window: usize,
    pub z_entry_threshold: f64,
    pub z_exit_threshold: f64,
    pub z_stop_loss: f64,
    pub position_size_usd: f64,
    pub bars_per_day: usize,
    pub min_hedge_samples: usize,
    pub slippage_rate: f64,
    pub initial_capital: f64,
    pub cointegration_p_threshold: f64,
    pub hedge_mode: HedgeMode,
    pub hedge_reestimate_bars: u64,
    pub emit_exit_intents: bool,
    pub run_mode: RunMode,
    // Intents are only logged when true
    pub dry_run: bool,
    pub backtest_file: Option<String>,
    pub summary_file: Option<String>,
    pub trade_log_file: Option<String>,
    pub synthetic_days: usize,
    pub synthetic_seed: u64,
}

impl Default for PairTradeConfig {
    fn default() -> Self {
        Self {
            symbol_a: DEFAULT_SYMBOL_A.to_string(),
            symbol_b: DEFAULT_SYMBOL_B.to_string(),
            lookback_period: DEFAULT_LOOKBACK_PERIOD,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            z_entry_threshold: DEFAULT_ENTRY_Z,
            z_exit_threshold: DEFAULT_EXIT_Z,
            z_stop_loss: DEFAULT_STOP_LOSS_Z,
            position_size_usd: DEFAULT_POSITION_SIZE_USD,
            bars_per_day: DEFAULT_BARS_PER_DAY,
            min_hedge_samples: DEFAULT_MIN_HEDGE_SAMPLES,
            slippage_rate: DEFAULT_SLIPPAGE_RATE,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            cointegration_p_threshold: DEFAULT_COINTEGRATION_P,
            hedge_mode: HedgeMode::Frozen,
            hedge_reestimate_bars: DEFAULT_HEDGE_REESTIMATE_BARS,
            emit_exit_intents: false,
            run_mode: RunMode::Backtest,
            dry_run: true,
            backtest_file: None,
            summary_file: None,
            trade_log_file: None,
            synthetic_days: DEFAULT_SYNTHETIC_DAYS,
            synthetic_seed: DEFAULT_SYNTHETIC_SEED,
        }
    }
}

impl PairTradeConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("PAIRTRADE_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(path) = config_path {
            return Self::from_yaml_path(path);
        }
        Self::from_env()
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open PairTrade config {}", path_ref.display()))?;
        let yaml: PairTradeYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse PairTrade config {}", path_ref.display()))?;
        let mut cfg = Self::from_yaml(yaml)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let yaml: PairTradeYaml =
            serde_yaml::from_str(raw).context("failed to parse PairTrade config")?;
        Self::from_yaml(yaml)
    }

    fn from_yaml(yaml: PairTradeYaml) -> Result<Self> {
        let defaults = Self::default();
        let run_mode = match yaml.run_mode.as_deref() {
            Some(raw) => raw
                .parse::<RunMode>()
                .map_err(|_| ConfigError::Invalid(format!("unknown run_mode '{}'", raw)))?,
            None => defaults.run_mode,
        };
        Ok(PairTradeConfig {
            symbol_a: yaml.symbol_a.unwrap_or(defaults.symbol_a),
            symbol_b: yaml.symbol_b.unwrap_or(defaults.symbol_b),
            lookback_period: yaml.lookback_period.unwrap_or(defaults.lookback_period),
            rolling_window: yaml.rolling_window.unwrap_or(defaults.rolling_window),
            z_entry_threshold: yaml.z_entry_threshold.unwrap_or(defaults.z_entry_threshold),
            z_exit_threshold: yaml.z_exit_threshold.unwrap_or(defaults.z_exit_threshold),
            z_stop_loss: yaml.z_stop_loss.unwrap_or(defaults.z_stop_loss),
            position_size_usd: yaml.position_size_usd.unwrap_or(defaults.position_size_usd),
            bars_per_day: yaml.bars_per_day.unwrap_or(defaults.bars_per_day),
            min_hedge_samples: yaml.min_hedge_samples.unwrap_or(defaults.min_hedge_samples),
            slippage_rate: yaml.slippage_rate.unwrap_or(defaults.slippage_rate),
            initial_capital: yaml.initial_capital.unwrap_or(defaults.initial_capital),
            cointegration_p_threshold: yaml
                .cointegration_p_threshold
                .unwrap_or(defaults.cointegration_p_threshold),
            hedge_mode: yaml.hedge_mode.unwrap_or(defaults.hedge_mode),
            hedge_reestimate_bars: yaml
                .hedge_reestimate_bars
                .unwrap_or(defaults.hedge_reestimate_bars),
            emit_exit_intents: yaml.emit_exit_intents.unwrap_or(defaults.emit_exit_intents),
            run_mode,
            dry_run: yaml.dry_run.unwrap_or(defaults.dry_run),
            backtest_file: yaml.backtest_file.filter(|v| !v.trim().is_empty()),
            summary_file: yaml.summary_file.filter(|v| !v.trim().is_empty()),
            trade_log_file: yaml.trade_log_file.filter(|v| !v.trim().is_empty()),
            synthetic_days: yaml.synthetic_days.unwrap_or(defaults.synthetic_days),
            synthetic_seed: yaml.synthetic_seed.unwrap_or(defaults.synthetic_seed),
        })
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies `KEY=value` overrides from `lookup`. Blank values are ignored,
    /// unparsable ones are an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("PAIRTRADE_SYMBOL_A") {
            self.symbol_a = value.trim().to_string();
        }
        if let Some(value) = get("PAIRTRADE_SYMBOL_B") {
            self.symbol_b = value.trim().to_string();
        }
        override_parsed(&get, "LOOKBACK_PERIOD", &mut self.lookback_period)?;
        override_parsed(&get, "ROLLING_WINDOW", &mut self.rolling_window)?;
        override_parsed(&get, "ENTRY_Z_SCORE", &mut self.z_entry_threshold)?;
        override_parsed(&get, "EXIT_Z_SCORE", &mut self.z_exit_threshold)?;
        override_parsed(&get, "STOP_LOSS_Z_SCORE", &mut self.z_stop_loss)?;
        override_parsed(&get, "POSITION_SIZE_USD", &mut self.position_size_usd)?;
        override_parsed(&get, "BARS_PER_DAY", &mut self.bars_per_day)?;
        override_parsed(&get, "MIN_HEDGE_SAMPLES", &mut self.min_hedge_samples)?;
        override_parsed(&get, "SLIPPAGE_RATE", &mut self.slippage_rate)?;
        override_parsed(&get, "INITIAL_CAPITAL", &mut self.initial_capital)?;
        override_parsed(
            &get,
            "COINTEGRATION_P_THRESHOLD",
            &mut self.cointegration_p_threshold,
        )?;
        override_parsed(&get, "HEDGE_REESTIMATE_BARS", &mut self.hedge_reestimate_bars)?;
        override_parsed(&get, "SYNTHETIC_DAYS", &mut self.synthetic_days)?;
        override_parsed(&get, "SYNTHETIC_SEED", &mut self.synthetic_seed)?;
        if let Some(value) = get("HEDGE_MODE") {
            self.hedge_mode = value
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown HEDGE_MODE '{}'", value)))?;
        }
        if let Some(value) = get("RUN_MODE") {
            self.run_mode = value
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown RUN_MODE '{}'", value)))?;
        }
        if let Some(value) = get("EMIT_EXIT_INTENTS") {
            self.emit_exit_intents = parse_flag(&value);
        }
        if let Some(value) = get("DRY_RUN") {
            self.dry_run = parse_flag(&value);
        }
        if let Some(value) = get("BACKTEST_FILE") {
            self.backtest_file = Some(value.trim().to_string());
        }
        if let Some(value) = get("SUMMARY_FILE") {
            self.summary_file = Some(value.trim().to_string());
        }
        if let Some(value) = get("TRADE_LOG_FILE") {
            self.trade_log_file = Some(value.trim().to_string());
        }
        Ok(())
    }

    /// Maximum closes kept per leg.
    pub fn price_capacity(&self) -> usize {
        self.lookback_period.saturating_mul(self.bars_per_day)
    }

    /// Maximum spread samples in the z-score window.
    pub fn spread_capacity(&self) -> usize {
        self.rolling_window.saturating_mul(self.bars_per_day)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.symbol_a.trim().is_empty() || self.symbol_b.trim().is_empty() {
            return invalid("symbol_a and symbol_b must be set".to_string());
        }
        if self.symbol_a == self.symbol_b {
            return invalid(format!("both legs use the same symbol {}", self.symbol_a));
        }
        if self.lookback_period == 0 || self.rolling_window == 0 || self.bars_per_day == 0 {
            return invalid(format!(
                "lookback_period ({}), rolling_window ({}) and bars_per_day ({}) must be positive",
                self.lookback_period, self.rolling_window, self.bars_per_day
            ));
        }
        if self.lookback_period.checked_mul(self.bars_per_day).is_none()
            || self.rolling_window.checked_mul(self.bars_per_day).is_none()
        {
            return invalid("history capacity overflows".to_string());
        }
        let thresholds = [
            self.z_entry_threshold,
            self.z_exit_threshold,
            self.z_stop_loss,
        ];
        if thresholds.iter().any(|z| !z.is_finite()) {
            return invalid("z thresholds must be finite".to_string());
        }
        if !(self.z_exit_threshold > 0.0
            && self.z_entry_threshold > self.z_exit_threshold
            && self.z_stop_loss > self.z_entry_threshold)
        {
            return invalid(format!(
                "thresholds must satisfy z_stop_loss > z_entry_threshold > z_exit_threshold > 0 (got stop={} entry={} exit={})",
                self.z_stop_loss, self.z_entry_threshold, self.z_exit_threshold
            ));
        }
        if !(self.position_size_usd.is_finite() && self.position_size_usd > 0.0) {
            return invalid(format!(
                "position_size_usd must be positive (got {})",
                self.position_size_usd
            ));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return invalid(format!(
                "initial_capital must be positive (got {})",
                self.initial_capital
            ));
        }
        if !(self.slippage_rate.is_finite() && (0.0..1.0).contains(&self.slippage_rate)) {
            return invalid(format!(
                "slippage_rate must be in [0, 1) (got {})",
                self.slippage_rate
            ));
        }
        if !(self.cointegration_p_threshold > 0.0 && self.cointegration_p_threshold < 1.0) {
            return invalid(format!(
                "cointegration_p_threshold must be in (0, 1) (got {})",
                self.cointegration_p_threshold
            ));
        }
        if self.min_hedge_samples < 2 {
            return invalid("min_hedge_samples must be at least 2".to_string());
        }
        if self.price_capacity() < self.min_hedge_samples {
            return invalid(format!(
                "price history holds {} bars but the hedge estimate needs {}",
                self.price_capacity(),
                self.min_hedge_samples
            ));
        }
        if self.hedge_mode == HedgeMode::Rolling && self.hedge_reestimate_bars == 0 {
            return invalid("hedge_reestimate_bars must be positive in rolling mode".to_string());
        }
        Ok(())
    }
}

fn override_parsed<G, T>(get: &G, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    ConfigError: From<T::Err>,
{
    if let Some(value) = get(key) {
        *target = value.trim().parse()?;
    }
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower == "1" || lower == "true" || lower == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = PairTradeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.price_capacity(), 60 * 1440);
        assert_eq!(cfg.spread_capacity(), 20 * 1440);
        assert_eq!(cfg.hedge_mode, HedgeMode::Frozen);
    }

    #[test]
    fn yaml_fields_override_defaults() {
        let cfg = PairTradeConfig::from_yaml_str(
            "symbol_a: SOLUSDT\nrolling_window: 5\nz_entry_threshold: 1.8\nhedge_mode: rolling\nrun_mode: live\n",
        )
        .unwrap();
        assert_eq!(cfg.symbol_a, "SOLUSDT");
        assert_eq!(cfg.symbol_b, DEFAULT_SYMBOL_B);
        assert_eq!(cfg.rolling_window, 5);
        assert_eq!(cfg.z_entry_threshold, 1.8);
        assert_eq!(cfg.hedge_mode, HedgeMode::Rolling);
        assert_eq!(cfg.run_mode, RunMode::Live);
    }

    #[test]
    fn unknown_yaml_keys_are_rejected() {
        assert!(PairTradeConfig::from_yaml_str("z_entry: 2.0\n").is_err());
    }

    #[test]
    fn yaml_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "position_size_usd: 2500.0\nbars_per_day: 24").unwrap();
        let cfg = PairTradeConfig::from_yaml_path(file.path()).unwrap();
        assert_eq!(cfg.position_size_usd, 2500.0);
        assert_eq!(cfg.bars_per_day, 24);
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let mut cfg = PairTradeConfig::default();
        cfg.apply_overrides(lookup(&[
            ("ENTRY_Z_SCORE", "2.5"),
            ("BARS_PER_DAY", "24"),
            ("HEDGE_MODE", "rolling"),
            ("EMIT_EXIT_INTENTS", "yes"),
            ("BACKTEST_FILE", "  "),
        ]))
        .unwrap();
        assert_eq!(cfg.z_entry_threshold, 2.5);
        assert_eq!(cfg.bars_per_day, 24);
        assert_eq!(cfg.hedge_mode, HedgeMode::Rolling);
        assert!(cfg.emit_exit_intents);
        assert!(cfg.backtest_file.is_none());

        let err = cfg
            .apply_overrides(lookup(&[("ROLLING_WINDOW", "twenty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseIntError(_)));
        let err = cfg
            .apply_overrides(lookup(&[("STOP_LOSS_Z_SCORE", "x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseFloatError(_)));
    }

    #[test]
    fn threshold_ordering_is_enforced() {
        let mut cfg = PairTradeConfig::default();
        cfg.z_stop_loss = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = PairTradeConfig::default();
        cfg.z_exit_threshold = 2.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PairTradeConfig::default();
        cfg.z_exit_threshold = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_sizing_and_windows_are_rejected() {
        for mutate in [
            (|c: &mut PairTradeConfig| c.position_size_usd = 0.0) as fn(&mut PairTradeConfig),
            |c| c.rolling_window = 0,
            |c| c.lookback_period = 0,
            |c| c.bars_per_day = 0,
            |c| c.initial_capital = -1.0,
            |c| c.slippage_rate = -0.01,
            |c| c.symbol_b = c.symbol_a.clone(),
        ] {
            let mut cfg = PairTradeConfig::default();
            mutate(&mut cfg);
            assert!(cfg.validate().is_err(), "{:?}", cfg);
        }
    }

    #[test]
    fn price_history_must_fit_the_hedge_window() {
        let mut cfg = PairTradeConfig::default();
        cfg.lookback_period = 1;
        cfg.bars_per_day = 50;
        assert!(cfg.validate().is_err());
        cfg.bars_per_day = 100;
        assert!(cfg.validate().is_ok());
    }
}
