pub mod error;
pub mod events;
pub mod hedge;
pub mod history;
pub mod pnl;
pub mod signal;
pub mod spread;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ConfigError, PairTradeConfig};

pub use error::DataError;
pub use events::{log_event, EngineEvent};
pub use hedge::{HedgeEstimator, HedgeMode};
pub use history::{AlignedPair, PriceHistory};
pub use pnl::{BacktestSummary, EquitySnapshot, PnlLedger, TradeRecord};
pub use signal::{
    decide, Decision, ExitReason, LegSymbols, Position, PositionDirection, PositionState, Side,
    Thresholds, TradeIntent,
};
pub use spread::{SpreadTracker, ZScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    A,
    B,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Leg::A => write!(f, "A"),
            Leg::B => write!(f, "B"),
        }
    }
}

/// One closed bar for one leg of the pair. `ts` is epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub leg: Leg,
    pub close: f64,
    pub ts: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub events: Vec<EngineEvent>,
    pub intents: Vec<TradeIntent>,
}

impl TickOutcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.intents.is_empty()
    }
}

/// Push-bar interface shared by the replay and live drivers.
pub trait BarSink {
    fn key(&self) -> &str;
    fn push_bar(&mut self, bar: &Bar) -> Result<TickOutcome, DataError>;
    /// Called once when the feed ends.
    fn finish(&mut self) -> TickOutcome;
}

/// Pairs-trading engine for one pair. Single-threaded and free of I/O: every
/// bar goes through price history, hedge estimation, the spread tracker and
/// the position state machine, and the decisions come back as events.
#[derive(Debug)]
pub struct PairTradeEngine {
    cfg: PairTradeConfig,
    key: String,
    thresholds: Thresholds,
    history: PriceHistory,
    hedge: HedgeEstimator,
    spread: SpreadTracker,
    ledger: PnlLedger,
    position: Option<Position>,
    last_pair: Option<AlignedPair>,
    last_z: Option<f64>,
}

impl PairTradeEngine {
    pub fn new(cfg: PairTradeConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let key = format!("{}/{}", cfg.symbol_a, cfg.symbol_b);
        Ok(Self {
            key,
            thresholds: Thresholds {
                entry: cfg.z_entry_threshold,
                exit: cfg.z_exit_threshold,
                stop: cfg.z_stop_loss,
            },
            history: PriceHistory::new(cfg.price_capacity()),
            hedge: HedgeEstimator::new(
                cfg.hedge_mode,
                cfg.min_hedge_samples,
                cfg.hedge_reestimate_bars,
            ),
            spread: SpreadTracker::new(cfg.spread_capacity(), cfg.rolling_window),
            ledger: PnlLedger::new(
                cfg.initial_capital,
                cfg.position_size_usd,
                cfg.slippage_rate,
            ),
            position: None,
            last_pair: None,
            last_z: None,
            cfg,
        })
    }

    pub fn config(&self) -> &PairTradeConfig {
        &self.cfg
    }

    fn symbols(&self) -> LegSymbols<'_> {
        LegSymbols {
            a: &self.cfg.symbol_a,
            b: &self.cfg.symbol_b,
        }
    }

    /// Feeds one bar. A rejected bar leaves the engine untouched.
    pub fn on_bar(&mut self, bar: &Bar) -> Result<TickOutcome, DataError> {
        let pair = match self.history.push(bar.leg, bar.close, bar.ts)? {
            Some(pair) => pair,
            None => return Ok(TickOutcome::default()),
        };
        self.last_pair = Some(pair);
        let mut out = TickOutcome::default();

        let bars_per_day = self.cfg.bars_per_day as u64;
        if (self.history.pairs_formed() - 1) % bars_per_day == 0 {
            let snap = self.ledger.snapshot(pair.ts);
            out.events.push(EngineEvent::EquitySnapshot(snap));
        }

        self.refresh_hedge(pair.ts, &mut out);
        let hedge_ratio = match self.hedge.ratio() {
            Some(ratio) => ratio,
            None => return Ok(out),
        };

        let reading = self.spread.update(pair.price_a, pair.price_b, hedge_ratio)?;
        let z = match reading.score {
            ZScore::Value { z, .. } => z,
            ZScore::Insufficient { .. } | ZScore::Undefined => return Ok(out),
        };
        self.last_z = Some(z);

        let open = self.position.as_ref().map(|p| p.direction);
        match decide(open, z, &self.thresholds) {
            Decision::Hold => {}
            Decision::Enter(direction) => self.open(direction, &pair, z, hedge_ratio, &mut out),
            Decision::Exit(reason) => {
                if let Some(record) = self.close(&pair, z, reason, &mut out) {
                    out.events.push(EngineEvent::Exited(record));
                }
            }
        }
        Ok(out)
    }

    fn refresh_hedge(&mut self, ts: i64, out: &mut TickOutcome) {
        let flat = self.position.is_none();
        match self.hedge.update(&self.history, flat) {
            Ok(Some(estimate)) => {
                let p_value = estimate.cointegration.p_value;
                out.events.push(EngineEvent::HedgeEstimated {
                    ts,
                    beta: estimate.beta,
                    samples: estimate.samples,
                    p_value,
                    half_life: estimate.cointegration.half_life,
                });
                if p_value > self.cfg.cointegration_p_threshold {
                    out.events.push(EngineEvent::CointegrationWarning {
                        ts,
                        p_value,
                        threshold: self.cfg.cointegration_p_threshold,
                    });
                }
            }
            Ok(None) => {}
            Err(err) => out.events.push(EngineEvent::HedgeSkipped {
                ts,
                reason: err.to_string(),
            }),
        }
    }

    fn open(
        &mut self,
        direction: PositionDirection,
        pair: &AlignedPair,
        z: f64,
        hedge_ratio: f64,
        out: &mut TickOutcome,
    ) {
        let (qty_a, qty_b) = match signal::hedged_sizes(
            self.cfg.position_size_usd,
            hedge_ratio,
            pair.price_a,
            pair.price_b,
        ) {
            Some(sizes) => sizes,
            None => {
                log::warn!(
                    "[ENTRY] {} cannot size position at price_a={} price_b={}",
                    self.key,
                    pair.price_a,
                    pair.price_b
                );
                return;
            }
        };
        let position = Position {
            direction,
            entry_ts: pair.ts,
            entry_price_a: pair.price_a,
            entry_price_b: pair.price_b,
            entry_z: z,
            hedge_ratio,
            qty_a,
            qty_b,
        };
        let intents = match signal::entry_intents(self.symbols(), &position) {
            Some(intents) => intents,
            None => {
                log::warn!("[ENTRY] {} cannot price entry intents", self.key);
                return;
            }
        };
        out.intents.extend(intents);
        out.events.push(EngineEvent::Entered {
            ts: pair.ts,
            direction,
            z,
            price_a: pair.price_a,
            price_b: pair.price_b,
            qty_a,
            qty_b,
            hedge_ratio,
        });
        self.position = Some(position);
    }

    fn close(
        &mut self,
        pair: &AlignedPair,
        z: f64,
        reason: ExitReason,
        out: &mut TickOutcome,
    ) -> Option<TradeRecord> {
        let position = self.position.take()?;
        if self.cfg.emit_exit_intents {
            if let Some(intents) =
                signal::exit_intents(self.symbols(), &position, pair.price_a, pair.price_b)
            {
                out.intents.extend(intents);
            }
        }
        let record = self
            .ledger
            .close(&position, pair.price_a, pair.price_b, pair.ts, z, reason)
            .clone();
        Some(record)
    }

    /// Force-closes any open position at the last aligned prices, tagged
    /// `stop_loss`. Safe to call more than once.
    pub fn finalize(&mut self) -> TickOutcome {
        let mut out = TickOutcome::default();
        let pair = match (self.position.as_ref(), self.last_pair) {
            (Some(_), Some(pair)) => pair,
            _ => return out,
        };
        let z = self
            .last_z
            .or_else(|| self.position.as_ref().map(|p| p.entry_z))
            .unwrap_or(0.0);
        if let Some(record) = self.close(&pair, z, ExitReason::StopLoss, &mut out) {
            out.events.push(EngineEvent::ForceClosed(record));
            let snap = self.ledger.snapshot(pair.ts);
            out.events.push(EngineEvent::EquitySnapshot(snap));
        }
        out
    }

    /// Force-closes any open position like `finalize`, then drops price
    /// history, spreads and the hedge ratio. Capital, closed trades and the
    /// equity curve are kept.
    pub fn reset(&mut self) -> TickOutcome {
        let out = self.finalize();
        self.history = PriceHistory::new(self.cfg.price_capacity());
        self.hedge = HedgeEstimator::new(
            self.cfg.hedge_mode,
            self.cfg.min_hedge_samples,
            self.cfg.hedge_reestimate_bars,
        );
        self.spread = SpreadTracker::new(self.cfg.spread_capacity(), self.cfg.rolling_window);
        self.position = None;
        self.last_pair = None;
        self.last_z = None;
        log::info!(
            "[RESET] {} state cleared, capital={:.2}",
            self.key,
            self.ledger.capital()
        );
        out
    }

    pub fn summary(&self) -> BacktestSummary {
        self.ledger.summary(self.hedge.ratio())
    }

    pub fn trades(&self) -> &[TradeRecord] {
        self.ledger.trades()
    }

    pub fn equity_curve(&self) -> &[EquitySnapshot] {
        self.ledger.equity_curve()
    }

    pub fn capital(&self) -> f64 {
        self.ledger.capital()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn position_state(&self) -> PositionState {
        PositionState::from(self.position.as_ref().map(|p| p.direction))
    }

    pub fn hedge_ratio(&self) -> Option<f64> {
        self.hedge.ratio()
    }

    pub fn last_z(&self) -> Option<f64> {
        self.last_z
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn spread_len(&self) -> usize {
        self.spread.len()
    }
}

impl BarSink for PairTradeEngine {
    fn key(&self) -> &str {
        &self.key
    }

    fn push_bar(&mut self, bar: &Bar) -> Result<TickOutcome, DataError> {
        self.on_bar(bar)
    }

    fn finish(&mut self) -> TickOutcome {
        self.finalize()
    }
}
