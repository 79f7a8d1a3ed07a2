use crate::standardized_types::orders::{Order, OrderEvent, OrderId, OrderStatus, OrderType};
use crate::standardized_types::securities::SecurityMap;
use crate::strategies::handlers::market_handler::brokerage_models::BrokerageModel;
use crate::strategies::handlers::market_handler::fill_models::FillModel;
use crate::strategies::ledgers::Ledger;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::warn;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The simulated brokerage: pending orders plus a dirty flag saying the set
/// may contain fillable orders. `scan` is driven once per slice by the
/// engine, order events come back in ascending order id.
pub struct SimulatedBrokerage {
    pending: DashMap<OrderId, Order>,
    dirty: AtomicBool,
    fill_model: Box<dyn FillModel>,
    brokerage_model: Arc<dyn BrokerageModel>,
}

impl SimulatedBrokerage {
    pub fn new(fill_model: Box<dyn FillModel>, brokerage_model: Arc<dyn BrokerageModel>) -> Self {
        SimulatedBrokerage {
            pending: DashMap::new(),
            dirty: AtomicBool::new(false),
            fill_model,
            brokerage_model,
        }
    }

    pub fn brokerage_model(&self) -> &Arc<dyn BrokerageModel> {
        &self.brokerage_model
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, order_id: OrderId) -> bool {
        self.pending.contains_key(&order_id)
    }

    /// Accepts a `New` order: stores a clone, marks the set dirty and
    /// acknowledges with `Submitted`. Anything else is refused.
    pub fn place_order(&self, order: &Order, utc_time: DateTime<Utc>) -> Option<OrderEvent> {
        if order.status != OrderStatus::New {
            return None;
        }
        let mut stored = order.clone();
        stored.status = OrderStatus::Submitted;
        self.pending.insert(stored.id, stored);
        self.dirty.store(true, Ordering::Release);
        Some(OrderEvent::new(
            order.id,
            order.symbol.clone(),
            utc_time,
            OrderStatus::Submitted,
        ))
    }

    /// Replaces the stored clone of a pending order, acknowledging the
    /// update with `Submitted`.
    pub fn update_order(&self, order: &Order, utc_time: DateTime<Utc>) -> Option<OrderEvent> {
        if !self.pending.contains_key(&order.id) {
            return None;
        }
        let mut stored = order.clone();
        stored.status = OrderStatus::Submitted;
        self.pending.insert(stored.id, stored);
        self.dirty.store(true, Ordering::Release);
        Some(
            OrderEvent::new(order.id, order.symbol.clone(), utc_time, OrderStatus::Submitted)
                .with_message("Update accepted"),
        )
    }

    pub fn cancel_order(&self, order_id: OrderId, utc_time: DateTime<Utc>) -> Option<OrderEvent> {
        let (_, order) = self.pending.remove(&order_id)?;
        Some(OrderEvent::new(
            order_id,
            order.symbol,
            utc_time,
            OrderStatus::Canceled,
        ))
    }

    /// One matching pass against the current market state. No-op unless the
    /// pending set is dirty. Events come out in ascending order id, one
    /// terminal or fill event per order per pass.
    pub fn scan(&self, utc_time: DateTime<Utc>, securities: &SecurityMap, ledger: &Ledger) -> Vec<OrderEvent> {
        if !self.dirty.load(Ordering::Acquire) {
            return Vec::new();
        }

        let mut order_ids: Vec<OrderId> = self.pending.iter().map(|e| *e.key()).collect();
        order_ids.sort_unstable();

        let mut events = Vec::new();
        let mut needs_rescan = false;

        for order_id in order_ids {
            let order = match self.pending.get(&order_id) {
                Some(entry) => entry.clone(),
                None => continue,
            };

            if order.status.is_closed() {
                self.pending.remove(&order_id);
                continue;
            }

            // Non-market orders created this very instant wait for the next
            // slice so they cannot fill against the bar that carried them in.
            if order.created_utc == utc_time && order.order_type != OrderType::Market {
                needs_rescan = true;
                continue;
            }

            let security = match securities.get(&order.symbol) {
                Some(entry) => entry.clone(),
                None => {
                    warn!("Order #{}: no security for {}", order_id, order.symbol);
                    events.push(
                        OrderEvent::new(order_id, order.symbol.clone(), utc_time, OrderStatus::Invalid)
                            .with_message("Security not found"),
                    );
                    self.pending.remove(&order_id);
                    continue;
                }
            };

            if !self.brokerage_model.can_execute_order(&security, &order) {
                needs_rescan = true;
                continue;
            }

            // Buying power is only consumed by orders that increase absolute
            // exposure, reducing orders always pass.
            let current_quantity = ledger.quantity(&order.symbol);
            let projected = current_quantity + order.remaining_quantity();
            if projected.abs() > current_quantity.abs() {
                let reference_price = order
                    .limit_price
                    .unwrap_or_else(|| security.market_price_for(order.quantity));
                if reference_price > dec!(0) {
                    let leverage = self.brokerage_model.leverage(&security);
                    let fee = self.brokerage_model.order_fee(
                        &security,
                        order.remaining_quantity(),
                        reference_price,
                    );
                    let cost = order.remaining_quantity().abs()
                        * reference_price
                        * security.properties.contract_multiplier
                        / leverage
                        + fee;
                    let available = ledger.margin_remaining(|symbol| {
                        securities
                            .get(symbol)
                            .map(|s| self.brokerage_model.leverage(&s))
                            .unwrap_or(dec!(1))
                    });
                    if cost > available {
                        events.push(
                            OrderEvent::new(order_id, order.symbol.clone(), utc_time, OrderStatus::Invalid)
                                .with_message(&format!(
                                    "Insufficient buying power: cost {} available {}",
                                    cost, available
                                )),
                        );
                        self.pending.remove(&order_id);
                        continue;
                    }
                }
            }

            match self.fill_model.fill(&order, &security, utc_time) {
                Some(fill) if fill.quantity != dec!(0) => {
                    let fee = self
                        .brokerage_model
                        .order_fee(&security, fill.quantity, fill.price);
                    let filled_total = order.filled_quantity + fill.quantity;
                    let status = if filled_total == order.quantity {
                        OrderStatus::Filled
                    } else {
                        OrderStatus::PartiallyFilled
                    };
                    let mut event = OrderEvent::new(order_id, order.symbol.clone(), utc_time, status)
                        .with_fill(fill.quantity, fill.price);
                    event.order_fee = fee;
                    event.fill_price_currency = security.properties.quote_currency.clone();
                    events.push(event);

                    if status.is_closed() {
                        self.pending.remove(&order_id);
                    } else if let Some(mut stored) = self.pending.get_mut(&order_id) {
                        stored.filled_quantity = filled_total;
                        stored.status = status;
                        needs_rescan = true;
                    }
                }
                _ => {
                    // Nothing fillable this slice, keep it working.
                    needs_rescan = true;
                }
            }
        }

        self.dirty.store(needs_rescan, Ordering::Release);
        events
    }
}
