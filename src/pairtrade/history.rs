use std::collections::VecDeque;

use super::error::DataError;
use super::Leg;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub price: f64,
    pub ts: i64,
}

/// Latest close of each leg at the moment a new synchronized pair formed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedPair {
    pub price_a: f64,
    pub price_b: f64,
    pub ts: i64,
}

#[derive(Debug)]
struct Slot {
    samples: VecDeque<PriceSample>,
    received: u64,
    last_ts: Option<i64>,
}

impl Slot {
    fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            received: 0,
            last_ts: None,
        }
    }

    fn tail(&self, len: usize) -> Vec<f64> {
        let skip = self.samples.len().saturating_sub(len);
        self.samples.iter().skip(skip).map(|s| s.price).collect()
    }
}

/// Bounded close-price history for both legs of the pair.
///
/// Each leg keeps at most `cap` samples and evicts the oldest first. Bars may
/// arrive interleaved in any order; a new synchronized pair forms whenever the
/// slower leg receives another bar, and only then does `push` return the pair.
#[derive(Debug)]
pub struct PriceHistory {
    a: Slot,
    b: Slot,
    cap: usize,
    pairs_formed: u64,
}

impl PriceHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            a: Slot::new(cap),
            b: Slot::new(cap),
            cap,
            pairs_formed: 0,
        }
    }

    fn slot(&self, leg: Leg) -> &Slot {
        match leg {
            Leg::A => &self.a,
            Leg::B => &self.b,
        }
    }

    fn slot_mut(&mut self, leg: Leg) -> &mut Slot {
        match leg {
            Leg::A => &mut self.a,
            Leg::B => &mut self.b,
        }
    }

    /// Validates a bar without touching any state.
    pub fn check(&self, leg: Leg, price: f64, ts: i64) -> Result<(), DataError> {
        if !price.is_finite() {
            return Err(DataError::NonFinitePrice { leg });
        }
        if price <= 0.0 {
            return Err(DataError::NonPositivePrice { leg, price });
        }
        if let Some(last_ts) = self.slot(leg).last_ts {
            if ts < last_ts {
                return Err(DataError::OutOfOrder { leg, last_ts, ts });
            }
        }
        Ok(())
    }

    pub fn push(&mut self, leg: Leg, price: f64, ts: i64) -> Result<Option<AlignedPair>, DataError> {
        self.check(leg, price, ts)?;
        let cap = self.cap;
        let slot = self.slot_mut(leg);
        if slot.samples.len() >= cap {
            slot.samples.pop_front();
        }
        slot.samples.push_back(PriceSample { price, ts });
        slot.received += 1;
        slot.last_ts = Some(ts);

        let synced = self.a.received.min(self.b.received);
        if synced <= self.pairs_formed {
            return Ok(None);
        }
        self.pairs_formed = synced;
        match (self.a.samples.back(), self.b.samples.back()) {
            (Some(a), Some(b)) => Ok(Some(AlignedPair {
                price_a: a.price,
                price_b: b.price,
                ts: a.ts.max(b.ts),
            })),
            _ => Ok(None),
        }
    }

    pub fn synchronized_length(&self) -> usize {
        self.a.samples.len().min(self.b.samples.len())
    }

    /// Last `n` tail-aligned closes per leg, capped by the synchronized length.
    pub fn recent(&self, n: usize) -> (Vec<f64>, Vec<f64>) {
        let len = n.min(self.synchronized_length());
        (self.a.tail(len), self.b.tail(len))
    }

    pub fn len(&self, leg: Leg) -> usize {
        self.slot(leg).samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.samples.is_empty() && self.b.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn pairs_formed(&self) -> u64 {
        self.pairs_formed
    }

    pub fn last_price(&self, leg: Leg) -> Option<f64> {
        self.slot(leg).samples.back().map(|s| s.price)
    }

    pub fn front(&self, leg: Leg) -> Option<PriceSample> {
        self.slot(leg).samples.front().copied()
    }
}
