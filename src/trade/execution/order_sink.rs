use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use crate::pairtrade::TradeIntent;

#[derive(Debug)]
pub enum ExecutionError {
    Rejected(String),
    Unavailable(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionError::Rejected(msg) => write!(f, "order rejected: {}", msg),
            ExecutionError::Unavailable(msg) => write!(f, "execution unavailable: {}", msg),
        }
    }
}

impl Error for ExecutionError {}

/// Destination for the intents the engine emits. Fills never flow back into
/// the engine; accounting uses the reference prices.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, intent: &TradeIntent) -> Result<(), ExecutionError>;
}

/// Logs intents instead of routing them anywhere.
#[derive(Debug, Default)]
pub struct DryRunSink;

#[async_trait]
impl OrderSink for DryRunSink {
    async fn submit(&self, intent: &TradeIntent) -> Result<(), ExecutionError> {
        log::info!(
            "[DRY_RUN] {} {} {} @ {} (leg {})",
            intent.side,
            intent.quantity,
            intent.symbol,
            intent.reference_price,
            intent.leg
        );
        Ok(())
    }
}

/// Keeps every submitted intent in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    intents: Mutex<Vec<TradeIntent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intents(&self) -> Vec<TradeIntent> {
        match self.intents.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl OrderSink for RecordingSink {
    async fn submit(&self, intent: &TradeIntent) -> Result<(), ExecutionError> {
        let mut guard = self
            .intents
            .lock()
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;
        guard.push(intent.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairtrade::{Leg, Side};
    use rust_decimal_macros::dec;

    fn intent(side: Side) -> TradeIntent {
        TradeIntent {
            leg: Leg::A,
            symbol: "BTCUSDT-PERP".to_string(),
            side,
            quantity: dec!(0.025),
            reference_price: dec!(40000),
        }
    }

    #[tokio::test]
    async fn recording_sink_keeps_submission_order() {
        let sink = RecordingSink::new();
        sink.submit(&intent(Side::Buy)).await.unwrap();
        sink.submit(&intent(Side::Sell)).await.unwrap();
        let recorded = sink.intents();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].side, Side::Buy);
        assert_eq!(recorded[1].side, Side::Sell);
    }

    #[tokio::test]
    async fn dry_run_sink_accepts_everything() {
        let sink: Box<dyn OrderSink> = Box::new(DryRunSink);
        assert!(sink.submit(&intent(Side::Sell)).await.is_ok());
    }
}
