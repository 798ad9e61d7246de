use rust_decimal::Decimal;

use super::pnl::{EquitySnapshot, TradeRecord};
use super::signal::PositionDirection;

/// Decision trail produced by the engine, in the order things happened
/// within a tick. Drivers log these; tests assert on them.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    HedgeEstimated {
        ts: i64,
        beta: f64,
        samples: usize,
        p_value: f64,
        half_life: f64,
    },
    /// Regression residuals failed the cointegration test. Trading continues.
    CointegrationWarning {
        ts: i64,
        p_value: f64,
        threshold: f64,
    },
    HedgeSkipped {
        ts: i64,
        reason: String,
    },
    Entered {
        ts: i64,
        direction: PositionDirection,
        z: f64,
        price_a: f64,
        price_b: f64,
        qty_a: Decimal,
        qty_b: Decimal,
        hedge_ratio: f64,
    },
    Exited(TradeRecord),
    /// Position closed by `finalize` at shutdown.
    ForceClosed(TradeRecord),
    EquitySnapshot(EquitySnapshot),
}

impl EngineEvent {
    pub fn trade(&self) -> Option<&TradeRecord> {
        match self {
            EngineEvent::Exited(record) | EngineEvent::ForceClosed(record) => Some(record),
            _ => None,
        }
    }
}

pub fn log_event(key: &str, event: &EngineEvent) {
    match event {
        EngineEvent::HedgeEstimated {
            ts,
            beta,
            samples,
            p_value,
            half_life,
        } => log::info!(
            "[HEDGE] {} beta={:.4} samples={} p={:.3} hl={:.1} bars ts={}",
            key,
            beta,
            samples,
            p_value,
            half_life,
            ts
        ),
        EngineEvent::CointegrationWarning {
            ts,
            p_value,
            threshold,
        } => log::warn!(
            "[HEDGE] {} pair not cointegrated (p={:.3} > {:.2}); trading anyway ts={}",
            key,
            p_value,
            threshold,
            ts
        ),
        EngineEvent::HedgeSkipped { ts, reason } => {
            log::warn!("[HEDGE] {} estimate skipped: {} ts={}", key, reason, ts)
        }
        EngineEvent::Entered {
            ts,
            direction,
            z,
            price_a,
            price_b,
            qty_a,
            qty_b,
            hedge_ratio,
        } => log::info!(
            "[ENTRY] pair={} direction={} size_a={} price_a={} size_b={} price_b={} z={:.2} beta={:.4} ts={}",
            key,
            direction,
            qty_a,
            price_a,
            qty_b,
            price_b,
            z,
            hedge_ratio,
            ts
        ),
        EngineEvent::Exited(record) => log::info!(
            "[EXIT] pair={} direction={} reason={} price_a={} price_b={} z={:.2} pnl={:.2} ts={}",
            key,
            record.direction,
            record.exit_reason,
            record.exit_price_a,
            record.exit_price_b,
            record.exit_z,
            record.pnl,
            record.exit_ts
        ),
        EngineEvent::ForceClosed(record) => log::warn!(
            "[EXIT] pair={} direction={} force-closed on shutdown price_a={} price_b={} pnl={:.2} ts={}",
            key,
            record.direction,
            record.exit_price_a,
            record.exit_price_b,
            record.pnl,
            record.exit_ts
        ),
        EngineEvent::EquitySnapshot(snap) => {
            log::debug!("[EQUITY] {} capital={:.2} ts={}", key, snap.capital, snap.ts)
        }
    }
}
