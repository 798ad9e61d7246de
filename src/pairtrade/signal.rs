use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Leg;

const QTY_DECIMALS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionDirection {
    /// Long leg A, short leg B.
    LongSpread,
    /// Short leg A, long leg B.
    ShortSpread,
}

impl fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PositionDirection::LongSpread => write!(f, "long_spread"),
            PositionDirection::ShortSpread => write!(f, "short_spread"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Flat,
    LongSpread,
    ShortSpread,
}

impl From<Option<PositionDirection>> for PositionState {
    fn from(direction: Option<PositionDirection>) -> Self {
        match direction {
            None => PositionState::Flat,
            Some(PositionDirection::LongSpread) => PositionState::LongSpread,
            Some(PositionDirection::ShortSpread) => PositionState::ShortSpread,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub entry: f64,
    pub exit: f64,
    pub stop: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Hold,
    Enter(PositionDirection),
    Exit(ExitReason),
}

/// One z-score in, at most one transition out. Stop-loss is checked before
/// the exit signal, and entries are only considered when flat.
pub fn decide(open: Option<PositionDirection>, z: f64, t: &Thresholds) -> Decision {
    match open {
        Some(direction) => {
            if z.abs() > t.stop {
                return Decision::Exit(ExitReason::StopLoss);
            }
            let exit = match direction {
                PositionDirection::LongSpread => z > -t.exit,
                PositionDirection::ShortSpread => z < t.exit,
            };
            if exit {
                Decision::Exit(ExitReason::Signal)
            } else {
                Decision::Hold
            }
        }
        None => {
            if z < -t.entry {
                Decision::Enter(PositionDirection::LongSpread)
            } else if z > t.entry {
                Decision::Enter(PositionDirection::ShortSpread)
            } else {
                Decision::Hold
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: PositionDirection,
    pub entry_ts: i64,
    pub entry_price_a: f64,
    pub entry_price_b: f64,
    pub entry_z: f64,
    pub hedge_ratio: f64,
    pub qty_a: Decimal,
    pub qty_b: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Sized order request handed to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub leg: Leg,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub reference_price: Decimal,
}

fn round_qty(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(QTY_DECIMALS))
}

/// Leg quantities for a new spread position: `size / price_a` on A and
/// `|hedge| * size / price_b` on B, both rounded to 3 decimals.
pub fn hedged_sizes(
    position_size_usd: f64,
    hedge_ratio: f64,
    price_a: f64,
    price_b: f64,
) -> Option<(Decimal, Decimal)> {
    if price_a <= 0.0 || price_b <= 0.0 {
        return None;
    }
    let qty_a = round_qty(position_size_usd / price_a)?;
    let qty_b = round_qty(hedge_ratio.abs() * position_size_usd / price_b)?;
    Some((qty_a, qty_b))
}

/// Sides for legs A and B when opening `direction`. A negative hedge ratio
/// flips leg B so it trades in the same direction as leg A.
pub fn entry_sides(direction: PositionDirection, hedge_ratio: f64) -> (Side, Side) {
    let side_a = match direction {
        PositionDirection::LongSpread => Side::Buy,
        PositionDirection::ShortSpread => Side::Sell,
    };
    let side_b = if hedge_ratio < 0.0 {
        side_a
    } else {
        side_a.opposite()
    };
    (side_a, side_b)
}

#[derive(Debug, Clone, Copy)]
pub struct LegSymbols<'a> {
    pub a: &'a str,
    pub b: &'a str,
}

pub fn entry_intents(
    symbols: LegSymbols<'_>,
    position: &Position,
) -> Option<[TradeIntent; 2]> {
    let (side_a, side_b) = entry_sides(position.direction, position.hedge_ratio);
    Some([
        TradeIntent {
            leg: Leg::A,
            symbol: symbols.a.to_string(),
            side: side_a,
            quantity: position.qty_a,
            reference_price: Decimal::from_f64(position.entry_price_a)?,
        },
        TradeIntent {
            leg: Leg::B,
            symbol: symbols.b.to_string(),
            side: side_b,
            quantity: position.qty_b,
            reference_price: Decimal::from_f64(position.entry_price_b)?,
        },
    ])
}

/// Orders that flatten `position`, for sinks that route real executions.
pub fn exit_intents(
    symbols: LegSymbols<'_>,
    position: &Position,
    price_a: f64,
    price_b: f64,
) -> Option<[TradeIntent; 2]> {
    let (side_a, side_b) = entry_sides(position.direction, position.hedge_ratio);
    Some([
        TradeIntent {
            leg: Leg::A,
            symbol: symbols.a.to_string(),
            side: side_a.opposite(),
            quantity: position.qty_a,
            reference_price: Decimal::from_f64(price_a)?,
        },
        TradeIntent {
            leg: Leg::B,
            symbol: symbols.b.to_string(),
            side: side_b.opposite(),
            quantity: position.qty_b,
            reference_price: Decimal::from_f64(price_b)?,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const T: Thresholds = Thresholds {
        entry: 2.0,
        exit: 0.5,
        stop: 3.0,
    };

    #[test]
    fn flat_enters_on_either_side() {
        assert_eq!(
            decide(None, -2.1, &T),
            Decision::Enter(PositionDirection::LongSpread)
        );
        assert_eq!(
            decide(None, 2.1, &T),
            Decision::Enter(PositionDirection::ShortSpread)
        );
        assert_eq!(decide(None, 2.0, &T), Decision::Hold);
        assert_eq!(decide(None, -1.0, &T), Decision::Hold);
    }

    #[test]
    fn signal_exit_per_direction() {
        let long = Some(PositionDirection::LongSpread);
        let short = Some(PositionDirection::ShortSpread);
        assert_eq!(decide(long, -0.4, &T), Decision::Exit(ExitReason::Signal));
        assert_eq!(decide(long, -1.5, &T), Decision::Hold);
        assert_eq!(decide(short, 0.4, &T), Decision::Exit(ExitReason::Signal));
        assert_eq!(decide(short, 1.5, &T), Decision::Hold);
    }

    #[test]
    fn stop_loss_wins_when_exit_would_also_fire() {
        // short spread with a large negative z satisfies both z < exit and |z| > stop
        let short = Some(PositionDirection::ShortSpread);
        assert_eq!(decide(short, -3.5, &T), Decision::Exit(ExitReason::StopLoss));
        let long = Some(PositionDirection::LongSpread);
        assert_eq!(decide(long, 3.5, &T), Decision::Exit(ExitReason::StopLoss));
        assert_eq!(decide(long, -3.5, &T), Decision::Exit(ExitReason::StopLoss));
    }

    #[test]
    fn open_position_never_re_enters() {
        let short = Some(PositionDirection::ShortSpread);
        assert_eq!(decide(short, 2.5, &T), Decision::Hold);
    }

    #[test]
    fn hedged_sizes_round_to_three_decimals() {
        let (qty_a, qty_b) = hedged_sizes(1000.0, 1.5, 40_000.0, 2_500.0).unwrap();
        assert_eq!(qty_a, dec!(0.025));
        assert_eq!(qty_b, dec!(0.6));
        let (qty_a, _) = hedged_sizes(1000.0, 1.0, 30_000.0, 100.0).unwrap();
        assert_eq!(qty_a, dec!(0.033));
        assert!(hedged_sizes(1000.0, 1.0, 0.0, 100.0).is_none());
    }

    #[test]
    fn entry_and_exit_intents_mirror_each_other() {
        let position = Position {
            direction: PositionDirection::LongSpread,
            entry_ts: 0,
            entry_price_a: 100.0,
            entry_price_b: 50.0,
            entry_z: -2.2,
            hedge_ratio: 0.8,
            qty_a: dec!(10),
            qty_b: dec!(16),
        };
        let symbols = LegSymbols { a: "AAA", b: "BBB" };
        let entry = entry_intents(symbols, &position).unwrap();
        assert_eq!(entry[0].side, Side::Buy);
        assert_eq!(entry[0].symbol, "AAA");
        assert_eq!(entry[1].side, Side::Sell);
        assert_eq!(entry[1].reference_price, dec!(50));
        let exit = exit_intents(symbols, &position, 101.0, 49.0).unwrap();
        assert_eq!(exit[0].side, Side::Sell);
        assert_eq!(exit[1].side, Side::Buy);
        assert_eq!(exit[1].quantity, dec!(16));
    }

    #[test]
    fn negative_hedge_trades_both_legs_together() {
        assert_eq!(
            entry_sides(PositionDirection::ShortSpread, -0.5),
            (Side::Sell, Side::Sell)
        );
        assert_eq!(
            entry_sides(PositionDirection::ShortSpread, 0.5),
            (Side::Sell, Side::Buy)
        );
    }
}
