use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::pairtrade::{Bar, Leg};

// 2024-01-01T00:00:00Z
const SYNTHETIC_START_MS: i64 = 1_704_067_200_000;

/// Cointegrated price pair for demos and smoke tests. Leg B is a geometric
/// random walk; leg A follows `hedge_ratio * ln(B)` plus an AR(1) spread.
#[derive(Debug, Clone)]
pub struct SyntheticPairParams {
    pub days: usize,
    pub bars_per_day: usize,
    pub start_price_a: f64,
    pub start_price_b: f64,
    pub hedge_ratio: f64,
    pub drift: f64,
    pub bar_volatility: f64,
    pub spread_volatility: f64,
    /// AR(1) coefficient of the spread, below 1 for mean reversion.
    pub spread_persistence: f64,
    pub start_ms: i64,
    pub interval_ms: i64,
    pub seed: u64,
}

impl Default for SyntheticPairParams {
    fn default() -> Self {
        Self {
            days: 90,
            bars_per_day: 1440,
            start_price_a: 40_000.0,
            start_price_b: 2_500.0,
            hedge_ratio: 1.2,
            drift: 0.000_001,
            bar_volatility: 0.000_8,
            spread_volatility: 0.000_4,
            spread_persistence: 0.98,
            start_ms: SYNTHETIC_START_MS,
            interval_ms: 60_000,
            seed: 42,
        }
    }
}

/// Interleaved A/B bars, both legs stamped with the same timestamp per step.
pub fn generate(params: &SyntheticPairParams) -> Vec<Bar> {
    let n_bars = params.days.saturating_mul(params.bars_per_day);
    let mut rng = StdRng::seed_from_u64(params.seed);
    let (returns, spread_noise) = match (
        Normal::new(params.drift, params.bar_volatility.abs()),
        Normal::new(0.0, params.spread_volatility.abs()),
    ) {
        (Ok(r), Ok(s)) => (r, s),
        _ => return Vec::new(),
    };

    let log_b0 = params.start_price_b.ln();
    let log_a0 = params.start_price_a.ln();
    let mut log_b = log_b0;
    let mut spread = 0.0;
    let mut bars = Vec::with_capacity(n_bars * 2);
    for i in 0..n_bars {
        let ts = params.start_ms + i as i64 * params.interval_ms;
        let log_a = log_a0 + params.hedge_ratio * (log_b - log_b0) + spread;
        bars.push(Bar {
            leg: Leg::A,
            close: log_a.exp(),
            ts,
        });
        bars.push(Bar {
            leg: Leg::B,
            close: log_b.exp(),
            ts,
        });
        log_b += returns.sample(&mut rng);
        spread = params.spread_persistence * spread + spread_noise.sample(&mut rng);
    }
    bars
}
