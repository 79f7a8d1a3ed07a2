use crate::errors::EngineError;
use crate::standardized_types::orders::{Order, OrderEvent, OrderId, OrderStatus};
use ahash::AHashSet;
use async_trait::async_trait;
use log::warn;
use std::fmt;

/// Messages a live broker connection reports outside the order flow.
/// Disconnect and reconnect reach the algorithm through dedicated callbacks,
/// errors are reported and may abort the run per broker policy.
#[derive(Clone, Debug, PartialEq)]
pub enum BrokerMessage {
    Information(String),
    Warning(String),
    Error(String),
    Disconnect,
    Reconnect,
}

impl fmt::Display for BrokerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerMessage::Information(m) => write!(f, "Information: {}", m),
            BrokerMessage::Warning(m) => write!(f, "Warning: {}", m),
            BrokerMessage::Error(m) => write!(f, "Error: {}", m),
            BrokerMessage::Disconnect => write!(f, "Disconnect"),
            BrokerMessage::Reconnect => write!(f, "Reconnect"),
        }
    }
}

/// A live broker adapter. Placement calls mean "accepted for transmission",
/// fulfillment arrives asynchronously through the event stream. Per-order
/// event ordering must be preserved by the adapter, cross-order concurrency
/// is allowed.
#[async_trait]
pub trait LiveBrokerage: Send + Sync {
    async fn place_order(&self, order: &Order) -> Result<(), EngineError>;
    async fn update_order(&self, order: &Order) -> Result<(), EngineError>;
    async fn cancel_order(&self, order_id: OrderId) -> Result<(), EngineError>;

    /// The next order event or broker message, awaited by the live pump.
    async fn next_event(&self) -> Option<LiveBrokerEvent>;
}

#[derive(Clone, Debug)]
pub enum LiveBrokerEvent {
    Order(OrderEvent),
    Message(BrokerMessage),
}

/// Normalizes broker-originated order events into sequences the order state
/// machine accepts. Some brokerages report fills without a preceding
/// submission acknowledgment, the pump synthesizes the missing `Submitted`
/// and logs a warning.
#[derive(Default)]
pub struct LiveOrderEventPump {
    acknowledged: AHashSet<OrderId>,
}

impl LiveOrderEventPump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, event: OrderEvent) -> Vec<OrderEvent> {
        let mut out = Vec::new();
        match event.status {
            OrderStatus::Submitted => {
                self.acknowledged.insert(event.order_id);
            }
            OrderStatus::Filled | OrderStatus::PartiallyFilled => {
                if self.acknowledged.insert(event.order_id) {
                    warn!(
                        "Order #{}: fill reported without submission acknowledgment, synthesizing Submitted",
                        event.order_id
                    );
                    out.push(
                        OrderEvent::new(
                            event.order_id,
                            event.symbol.clone(),
                            event.utc_time,
                            OrderStatus::Submitted,
                        )
                        .with_message("Synthesized submission acknowledgment"),
                    );
                }
            }
            _ => {}
        }
        if event.status.is_closed() {
            self.acknowledged.remove(&event.order_id);
        }
        out.push(event);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::symbols::{SecurityIdentifier, Symbol};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string())
    }

    #[test]
    fn synthesizes_missing_submitted() {
        let mut pump = LiveOrderEventPump::new();
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap();
        let fill = OrderEvent::new(7, symbol(), time, OrderStatus::Filled)
            .with_fill(dec!(10), dec!(150));
        let events = pump.normalize(fill);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, OrderStatus::Submitted);
        assert_eq!(events[1].status, OrderStatus::Filled);
    }

    #[test]
    fn acknowledged_orders_pass_through() {
        let mut pump = LiveOrderEventPump::new();
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap();
        let submitted = OrderEvent::new(7, symbol(), time, OrderStatus::Submitted);
        assert_eq!(pump.normalize(submitted).len(), 1);
        let fill = OrderEvent::new(7, symbol(), time, OrderStatus::Filled)
            .with_fill(dec!(10), dec!(150));
        let events = pump.normalize(fill);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Filled);
    }

    #[test]
    fn partial_fill_synthesis_happens_once() {
        let mut pump = LiveOrderEventPump::new();
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap();
        let partial = OrderEvent::new(7, symbol(), time, OrderStatus::PartiallyFilled)
            .with_fill(dec!(5), dec!(150));
        assert_eq!(pump.normalize(partial.clone()).len(), 2);
        assert_eq!(pump.normalize(partial).len(), 1);
    }
}
