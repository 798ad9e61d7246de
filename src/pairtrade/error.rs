use std::error::Error;
use std::fmt;

use super::Leg;

/// Per-tick data anomaly. The offending bar is dropped and nothing in the
/// engine is mutated; processing continues with the next bar.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    NonPositivePrice { leg: Leg, price: f64 },
    NonFinitePrice { leg: Leg },
    OutOfOrder { leg: Leg, last_ts: i64, ts: i64 },
    DegenerateRegression,
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataError::NonPositivePrice { leg, price } => {
                write!(f, "non-positive price {} on leg {}", price, leg)
            }
            DataError::NonFinitePrice { leg } => write!(f, "non-finite price on leg {}", leg),
            DataError::OutOfOrder { leg, last_ts, ts } => write!(
                f,
                "out-of-order bar on leg {}: ts={} is older than last ts={}",
                leg, ts, last_ts
            ),
            DataError::DegenerateRegression => {
                write!(f, "hedge regression is degenerate (no variance in leg B)")
            }
        }
    }
}

impl Error for DataError {}
