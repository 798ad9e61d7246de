use std::collections::VecDeque;

use super::error::DataError;
use super::Leg;

/// Standard deviations at or below this are treated as zero variance.
pub const MIN_STD: f64 = 1e-12;
// Incremental std below this fraction of the window's scale is recomputed in two passes.
const RECHECK_REL_STD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZScore {
    /// Fewer spread samples than the rolling window requires.
    Insufficient { samples: usize, required: usize },
    /// The window has no variance, so there is no mean-reversion signal.
    Undefined,
    Value { z: f64, mean: f64, std: f64 },
}

impl ZScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            ZScore::Value { z, .. } => Some(*z),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadReading {
    pub spread: f64,
    pub score: ZScore,
}

pub fn log_spread(price_a: f64, price_b: f64, hedge_ratio: f64) -> Result<f64, DataError> {
    for (leg, price) in [(Leg::A, price_a), (Leg::B, price_b)] {
        if !price.is_finite() {
            return Err(DataError::NonFinitePrice { leg });
        }
        if price <= 0.0 {
            return Err(DataError::NonPositivePrice { leg, price });
        }
    }
    Ok(price_a.ln() - hedge_ratio * price_b.ln())
}

fn mean_std(window: &VecDeque<f64>) -> Option<(f64, f64)> {
    if window.is_empty() {
        return None;
    }
    let mean = window.iter().copied().sum::<f64>() / window.len() as f64;
    let var = window
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / window.len() as f64;
    Some((mean, var.sqrt()))
}

/// Rolling log-spread window with incremental mean/std.
///
/// Sums are kept relative to an anchor value to avoid cancellation, and are
/// rebuilt from the window after every `cap` evictions to bound drift.
#[derive(Debug)]
pub struct SpreadTracker {
    window: VecDeque<f64>,
    cap: usize,
    min_samples: usize,
    anchor: f64,
    sum: f64,
    sum_sq: f64,
    evictions: usize,
}

impl SpreadTracker {
    pub fn new(cap: usize, min_samples: usize) -> Self {
        let cap = cap.max(1);
        Self {
            window: VecDeque::with_capacity(cap),
            cap,
            min_samples: min_samples.max(1),
            anchor: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
            evictions: 0,
        }
    }

    pub fn update(
        &mut self,
        price_a: f64,
        price_b: f64,
        hedge_ratio: f64,
    ) -> Result<SpreadReading, DataError> {
        let spread = log_spread(price_a, price_b, hedge_ratio)?;
        let score = self.push_spread(spread);
        Ok(SpreadReading { spread, score })
    }

    pub fn push_spread(&mut self, spread: f64) -> ZScore {
        if self.window.is_empty() {
            self.anchor = spread;
            self.sum = 0.0;
            self.sum_sq = 0.0;
        }
        if self.window.len() >= self.cap {
            if let Some(old) = self.window.pop_front() {
                let d = old - self.anchor;
                self.sum -= d;
                self.sum_sq -= d * d;
                self.evictions += 1;
            }
        }
        self.window.push_back(spread);
        let d = spread - self.anchor;
        self.sum += d;
        self.sum_sq += d * d;
        if self.evictions >= self.cap {
            self.resum();
        }
        self.score(spread)
    }

    fn resum(&mut self) {
        self.evictions = 0;
        self.anchor = self.window.front().copied().unwrap_or(0.0);
        self.sum = 0.0;
        self.sum_sq = 0.0;
        for v in self.window.iter() {
            let d = v - self.anchor;
            self.sum += d;
            self.sum_sq += d * d;
        }
    }

    fn score(&self, latest: f64) -> ZScore {
        let n = self.window.len();
        if n < self.min_samples {
            return ZScore::Insufficient {
                samples: n,
                required: self.min_samples,
            };
        }
        let nf = n as f64;
        let shifted_mean = self.sum / nf;
        let var = ((self.sum_sq - self.sum * shifted_mean) / nf).max(0.0);
        let mut mean = self.anchor + shifted_mean;
        let mut std = var.sqrt();
        // running sums keep eviction residue, so a flat window needs an exact pass
        if std <= RECHECK_REL_STD * mean.abs().max(1.0) {
            match mean_std(&self.window) {
                Some((m, s)) => {
                    mean = m;
                    std = s;
                }
                None => return ZScore::Undefined,
            }
        }
        if std <= MIN_STD {
            return ZScore::Undefined;
        }
        ZScore::Value {
            z: (latest - mean) / std,
            mean,
            std,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn last(&self) -> Option<f64> {
        self.window.back().copied()
    }

    pub fn window(&self) -> &VecDeque<f64> {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_until_min_samples() {
        let mut tracker = SpreadTracker::new(10, 3);
        assert!(matches!(
            tracker.push_spread(0.1),
            ZScore::Insufficient {
                samples: 1,
                required: 3
            }
        ));
        assert!(tracker.push_spread(0.2).value().is_none());
        assert!(tracker.push_spread(0.3).value().is_some());
    }

    #[test]
    fn constant_spread_has_undefined_score() {
        let mut tracker = SpreadTracker::new(5, 2);
        for _ in 0..20 {
            let score = tracker.push_spread(0.693);
            assert!(score.value().is_none());
        }
        assert_eq!(tracker.push_spread(0.693), ZScore::Undefined);
    }

    #[test]
    fn incremental_stats_match_two_pass_over_window() {
        let mut tracker = SpreadTracker::new(7, 3);
        let mut last = ZScore::Undefined;
        for i in 0..200 {
            let x = 0.7 + 0.01 * ((i as f64) * 0.37).sin() + 1e-4 * (i % 5) as f64;
            last = tracker.push_spread(x);
        }
        assert_eq!(tracker.len(), 7);
        let (mean, std) = mean_std(tracker.window()).unwrap();
        match last {
            ZScore::Value { z, mean: m, std: s } => {
                assert!((m - mean).abs() < 1e-12);
                assert!((s - std).abs() < 1e-10);
                let expected = (tracker.last().unwrap() - mean) / std;
                assert!((z - expected).abs() < 1e-6);
            }
            other => panic!("expected a score, got {:?}", other),
        }
    }

    #[test]
    fn window_that_turns_flat_is_undefined_after_evictions() {
        for offset in 0..25 {
            let mut tracker = SpreadTracker::new(20, 20);
            for i in 0..(20 + offset) {
                tracker.push_spread(0.7 + 0.01 * (i as f64 * 0.9).sin());
            }
            let mut last = ZScore::Undefined;
            for _ in 0..20 {
                last = tracker.push_spread(std::f64::consts::LN_2);
            }
            assert_eq!(last, ZScore::Undefined, "offset {}", offset);
        }
    }

    #[test]
    fn small_but_real_dispersion_still_scores() {
        let mut tracker = SpreadTracker::new(4, 4);
        let mut last = ZScore::Undefined;
        for x in [0.7, 0.7 + 1e-8, 0.7, 0.7 + 1e-8] {
            last = tracker.push_spread(x);
        }
        match last {
            ZScore::Value { z, .. } => assert!((z - 1.0).abs() < 1e-4),
            other => panic!("expected a score, got {:?}", other),
        }
    }

    #[test]
    fn update_uses_log_spread() {
        let mut tracker = SpreadTracker::new(4, 1);
        let reading = tracker.update(100.0, 50.0, 1.5).unwrap();
        let expected = 100.0_f64.ln() - 1.5 * 50.0_f64.ln();
        assert!((reading.spread - expected).abs() < 1e-12);
        assert!(tracker.update(-1.0, 50.0, 1.5).is_err());
        assert_eq!(tracker.len(), 1);
    }
}
