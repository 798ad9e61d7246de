use serde::{Deserialize, Serialize};

use super::error::DataError;
use super::history::PriceHistory;
use super::Leg;

const MIN_VARIANCE: f64 = 1e-18;

/// How the hedge ratio evolves after the first estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HedgeMode {
    /// Estimated once and kept for the lifetime of the engine.
    #[default]
    Frozen,
    /// Re-estimated every `hedge_reestimate_bars` synchronized bars, only while flat.
    Rolling,
}

impl std::str::FromStr for HedgeMode {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "frozen" => Ok(HedgeMode::Frozen),
            "rolling" => Ok(HedgeMode::Rolling),
            _ => Err(()),
        }
    }
}

/// Engle-Granger style diagnostic on the regression residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cointegration {
    pub t_stat: f64,
    pub p_value: f64,
    /// Mean-reversion half-life of the residual spread, in bars.
    pub half_life: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeEstimate {
    pub beta: f64,
    pub intercept: f64,
    pub samples: usize,
    pub cointegration: Cointegration,
}

/// OLS slope of `y` regressed on `x`, `None` when `x` has no variance.
pub fn regression_beta(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
    }
    if var_x <= MIN_VARIANCE {
        None
    } else {
        Some(cov / var_x)
    }
}

pub fn log_prices(prices: &[f64], leg: Leg) -> Result<Vec<f64>, DataError> {
    prices
        .iter()
        .map(|&p| {
            if !p.is_finite() {
                Err(DataError::NonFinitePrice { leg })
            } else if p <= 0.0 {
                Err(DataError::NonPositivePrice { leg, price: p })
            } else {
                Ok(p.ln())
            }
        })
        .collect()
}

/// Slope of `log_a = beta * log_b + c`.
pub fn estimate(log_a: &[f64], log_b: &[f64]) -> Result<f64, DataError> {
    regression_beta(log_b, log_a).ok_or(DataError::DegenerateRegression)
}

pub fn estimate_from_prices(prices_a: &[f64], prices_b: &[f64]) -> Result<HedgeEstimate, DataError> {
    let log_a = log_prices(prices_a, Leg::A)?;
    let log_b = log_prices(prices_b, Leg::B)?;
    let n = log_a.len().min(log_b.len());
    let beta = estimate(&log_a[..n], &log_b[..n])?;
    let mean_a = log_a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = log_b[..n].iter().sum::<f64>() / n as f64;
    let intercept = mean_a - beta * mean_b;
    let residuals: Vec<f64> = log_a[..n]
        .iter()
        .zip(log_b[..n].iter())
        .map(|(a, b)| a - beta * b - intercept)
        .collect();
    Ok(HedgeEstimate {
        beta,
        intercept,
        samples: n,
        cointegration: cointegration_test(&residuals),
    })
}

/// ADF regression `dY_t = phi * Y_{t-1} + eps` on the residual spread.
pub fn cointegration_test(residuals: &[f64]) -> Cointegration {
    let undecided = Cointegration {
        t_stat: 0.0,
        p_value: 1.0,
        half_life: f64::INFINITY,
    };
    if residuals.len() < 5 {
        return undecided;
    }
    let mut x: Vec<f64> = Vec::with_capacity(residuals.len() - 1);
    let mut dy: Vec<f64> = Vec::with_capacity(residuals.len() - 1);
    for win in residuals.windows(2) {
        x.push(win[0]);
        dy.push(win[1] - win[0]);
    }
    let n = x.len();
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_dy = dy.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        num += dx * (dy[i] - mean_dy);
        den += dx * dx;
    }
    if den.abs() < 1e-24 {
        return undecided;
    }
    let phi = (num / den).clamp(-0.999, 0.999);

    let mut rss = 0.0;
    for i in 0..n {
        let fit = phi * (x[i] - mean_x) + mean_dy;
        let err = dy[i] - fit;
        rss += err * err;
    }
    let sigma2 = rss / (n.saturating_sub(2)).max(1) as f64;
    let se_phi = (sigma2 / den).sqrt();
    let t_stat = if se_phi < 1e-15 { 0.0 } else { phi / se_phi };

    let ar_coef = 1.0 + phi;
    let half_life = if ar_coef <= 0.0 || ar_coef >= 1.0 {
        f64::INFINITY
    } else {
        -(2.0_f64.ln()) / ar_coef.ln()
    };

    Cointegration {
        t_stat,
        p_value: eg_p_value(t_stat, n).clamp(0.0, 1.0),
        half_life,
    }
}

/// Two-variable Engle-Granger critical values with constant,
/// `c(T) = b0 + b1/T + b2/T^2` (MacKinnon response surface).
fn eg_critical_values(n: usize) -> (f64, f64, f64) {
    const SURFACE: [(f64, f64, f64); 3] = [
        (-3.89644, -10.9519, -22.527),
        (-3.33613, -6.1101, -6.823),
        (-3.04445, -4.2412, -2.720),
    ];
    let t = n.max(1) as f64;
    let crit = |(b0, b1, b2): (f64, f64, f64)| b0 + b1 / t + b2 / (t * t);
    (crit(SURFACE[0]), crit(SURFACE[1]), crit(SURFACE[2]))
}

fn eg_p_value(t_stat: f64, n: usize) -> f64 {
    let (c1, c5, c10) = eg_critical_values(n);
    let lerp = |t: f64, lo: f64, hi: f64, p_lo: f64, p_hi: f64| {
        let w = ((t - lo) / (hi - lo)).clamp(0.0, 1.0);
        p_lo + w * (p_hi - p_lo)
    };
    if t_stat < c1 {
        0.005
    } else if t_stat < c5 {
        lerp(t_stat, c1, c5, 0.01, 0.05)
    } else if t_stat < c10 {
        lerp(t_stat, c5, c10, 0.05, 0.10)
    } else {
        0.5
    }
}

/// Decides when the hedge ratio is (re)computed and holds the current value.
#[derive(Debug)]
pub struct HedgeEstimator {
    mode: HedgeMode,
    min_samples: usize,
    reestimate_every: u64,
    ratio: Option<f64>,
    estimated_at: Option<u64>,
    estimations: u32,
}

impl HedgeEstimator {
    pub fn new(mode: HedgeMode, min_samples: usize, reestimate_every: u64) -> Self {
        Self {
            mode,
            min_samples: min_samples.max(2),
            reestimate_every: reestimate_every.max(1),
            ratio: None,
            estimated_at: None,
            estimations: 0,
        }
    }

    pub fn ratio(&self) -> Option<f64> {
        self.ratio
    }

    pub fn estimations(&self) -> u32 {
        self.estimations
    }

    pub fn is_due(&self, history: &PriceHistory, flat: bool) -> bool {
        if history.synchronized_length() < self.min_samples {
            return false;
        }
        match (self.mode, self.estimated_at) {
            (_, None) => true,
            (HedgeMode::Frozen, Some(_)) => false,
            (HedgeMode::Rolling, Some(at)) => {
                flat && history.pairs_formed().saturating_sub(at) >= self.reestimate_every
            }
        }
    }

    /// Runs the regression when due. A failed estimate leaves the current
    /// ratio untouched so the next bar can retry.
    pub fn update(
        &mut self,
        history: &PriceHistory,
        flat: bool,
    ) -> Result<Option<HedgeEstimate>, DataError> {
        if !self.is_due(history, flat) {
            return Ok(None);
        }
        let (prices_a, prices_b) = history.recent(history.synchronized_length());
        let estimate = estimate_from_prices(&prices_a, &prices_b)?;
        self.ratio = Some(estimate.beta);
        self.estimated_at = Some(history.pairs_formed());
        self.estimations += 1;
        Ok(Some(estimate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn regression_beta_recovers_known_slope() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.7 * v + 3.0).collect();
        let beta = regression_beta(&x, &y).unwrap();
        assert!((beta - 1.7).abs() < 1e-9);
    }

    #[test]
    fn constant_leg_b_is_degenerate() {
        let a = vec![100.0, 101.0, 102.0, 103.0];
        let b = vec![50.0; 4];
        assert_eq!(
            estimate_from_prices(&a, &b).unwrap_err(),
            DataError::DegenerateRegression
        );
    }

    #[test]
    fn non_positive_price_is_a_data_error() {
        let a = vec![100.0, 0.0, 102.0];
        let b = vec![50.0, 51.0, 52.0];
        assert!(matches!(
            estimate_from_prices(&a, &b),
            Err(DataError::NonPositivePrice { leg: Leg::A, .. })
        ));
    }

    #[test]
    fn log_linear_prices_give_exact_beta() {
        let b: Vec<f64> = (0..120).map(|i| 50.0 * (0.01 * i as f64).exp()).collect();
        let a: Vec<f64> = b.iter().map(|p| 3.0 * p.powf(1.25)).collect();
        let est = estimate_from_prices(&a, &b).unwrap();
        assert!((est.beta - 1.25).abs() < 1e-9);
        assert!((est.intercept - 3.0_f64.ln()).abs() < 1e-9);
        assert_eq!(est.samples, 120);
    }

    #[test]
    fn mean_reverting_residuals_look_cointegrated() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut s = 0.0;
        let spread: Vec<f64> = (0..500)
            .map(|_| {
                s = 0.5 * s + noise.sample(&mut rng);
                s
            })
            .collect();
        let diag = cointegration_test(&spread);
        assert!(diag.p_value < 0.05, "p={}", diag.p_value);
        assert!(diag.half_life.is_finite() && diag.half_life < 5.0);
    }

    #[test]
    fn trending_residuals_are_not_cointegrated() {
        let trend: Vec<f64> = (0..200).map(|i| (i as f64).powf(1.5)).collect();
        let diag = cointegration_test(&trend);
        assert!(diag.p_value > 0.05, "p={}", diag.p_value);
        assert!(diag.half_life.is_infinite());
    }

    fn filled_history(n: usize, cap: usize) -> PriceHistory {
        let mut history = PriceHistory::new(cap);
        for i in 0..n {
            let b = 50.0 * (0.01 * (i as f64).sin()).exp();
            let a = b * b;
            history.push(Leg::A, a, i as i64).unwrap();
            history.push(Leg::B, b, i as i64).unwrap();
        }
        history
    }

    #[test]
    fn frozen_estimator_runs_exactly_once() {
        let mut estimator = HedgeEstimator::new(HedgeMode::Frozen, 100, 10);
        let history = filled_history(99, 500);
        assert!(estimator.update(&history, true).unwrap().is_none());
        assert_eq!(estimator.ratio(), None);

        let history = filled_history(100, 500);
        let est = estimator.update(&history, true).unwrap().unwrap();
        assert!((est.beta - 2.0).abs() < 1e-6);
        let frozen = estimator.ratio();

        let history = filled_history(400, 500);
        assert!(estimator.update(&history, true).unwrap().is_none());
        assert_eq!(estimator.ratio(), frozen);
        assert_eq!(estimator.estimations(), 1);
    }

    #[test]
    fn rolling_estimator_waits_for_interval_and_flat_book() {
        let mut estimator = HedgeEstimator::new(HedgeMode::Rolling, 100, 50);
        let mut history = PriceHistory::new(500);
        let push = |history: &mut PriceHistory, i: usize| {
            let b = 50.0 * (0.01 * (i as f64).sin()).exp();
            history.push(Leg::A, b * b, i as i64).unwrap();
            history.push(Leg::B, b, i as i64).unwrap();
        };
        for i in 0..100 {
            push(&mut history, i);
        }
        assert!(estimator.update(&history, true).unwrap().is_some());
        for i in 100..149 {
            push(&mut history, i);
        }
        assert!(!estimator.is_due(&history, true));
        push(&mut history, 149);
        assert!(!estimator.is_due(&history, false));
        assert!(estimator.is_due(&history, true));
        assert!(estimator.update(&history, true).unwrap().is_some());
        assert_eq!(estimator.estimations(), 2);
    }
}
