use crate::standardized_types::new_types::Price;
use crate::standardized_types::orders::{Order, OrderType};
use crate::standardized_types::securities::Security;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A deterministic fill decision: price and signed quantity. The matching
/// engine turns it into an `OrderEvent`.
#[derive(Clone, Debug, PartialEq)]
pub struct Fill {
    pub price: Price,
    pub quantity: Decimal,
}

/// Deterministic function from (security state, order) to a fill, or `None`
/// when the order cannot fill against the current slice. One method per
/// order type, the matching engine dispatches.
pub trait FillModel: Send + Sync {
    fn market_fill(&self, order: &Order, security: &Security) -> Option<Fill>;
    fn limit_fill(&self, order: &Order, security: &Security) -> Option<Fill>;
    fn stop_market_fill(&self, order: &Order, security: &Security) -> Option<Fill>;
    fn stop_limit_fill(&self, order: &Order, security: &Security) -> Option<Fill>;
    fn market_on_open_fill(
        &self,
        order: &Order,
        security: &Security,
        utc_time: DateTime<Utc>,
    ) -> Option<Fill>;
    fn market_on_close_fill(
        &self,
        order: &Order,
        security: &Security,
        utc_time: DateTime<Utc>,
    ) -> Option<Fill>;

    fn fill(&self, order: &Order, security: &Security, utc_time: DateTime<Utc>) -> Option<Fill> {
        match order.order_type {
            OrderType::Market => self.market_fill(order, security),
            OrderType::Limit => self.limit_fill(order, security),
            OrderType::StopMarket => self.stop_market_fill(order, security),
            OrderType::StopLimit => self.stop_limit_fill(order, security),
            OrderType::MarketOnOpen => self.market_on_open_fill(order, security, utc_time),
            OrderType::MarketOnClose => self.market_on_close_fill(order, security, utc_time),
        }
    }
}

/// Fills against the security's current bar state: market orders at the
/// touch, limit and stop orders against the bar's range with gap handling on
/// the open. Always fills the full remaining quantity.
pub struct ImmediateFillModel;

impl ImmediateFillModel {
    /// The bar range the order is tested against. Falls back to the last
    /// trade when no bar has been seen.
    fn bar_range(&self, security: &Security) -> Option<(Price, Price, Price)> {
        if security.low_price > dec!(0) && security.high_price > dec!(0) {
            Some((security.open_price, security.high_price, security.low_price))
        } else if security.has_price() {
            let reference = security.last_price;
            Some((reference, reference, reference))
        } else {
            None
        }
    }
}

impl FillModel for ImmediateFillModel {
    fn market_fill(&self, order: &Order, security: &Security) -> Option<Fill> {
        if !security.has_price() {
            return None;
        }
        Some(Fill {
            price: security.market_price_for(order.quantity),
            quantity: order.remaining_quantity(),
        })
    }

    fn limit_fill(&self, order: &Order, security: &Security) -> Option<Fill> {
        let limit = order.limit_price?;
        let (open, high, low) = self.bar_range(security)?;
        if order.is_buy() {
            if low <= limit {
                // A gap below the limit fills at the better open.
                let price = if open > dec!(0) && open < limit { open } else { limit };
                return Some(Fill {
                    price,
                    quantity: order.remaining_quantity(),
                });
            }
        } else if high >= limit {
            let price = if open > limit { open } else { limit };
            return Some(Fill {
                price,
                quantity: order.remaining_quantity(),
            });
        }
        None
    }

    fn stop_market_fill(&self, order: &Order, security: &Security) -> Option<Fill> {
        let stop = order.stop_price?;
        let (open, high, low) = self.bar_range(security)?;
        if order.is_buy() {
            if high >= stop {
                let price = if open > stop { open } else { stop };
                return Some(Fill {
                    price,
                    quantity: order.remaining_quantity(),
                });
            }
        } else if low <= stop {
            let price = if open > dec!(0) && open < stop { open } else { stop };
            return Some(Fill {
                price,
                quantity: order.remaining_quantity(),
            });
        }
        None
    }

    fn stop_limit_fill(&self, order: &Order, security: &Security) -> Option<Fill> {
        let stop = order.stop_price?;
        let limit = order.limit_price?;
        let (_, high, low) = self.bar_range(security)?;
        let triggered = if order.is_buy() { high >= stop } else { low <= stop };
        if !triggered {
            return None;
        }
        // Once triggered the limit governs, filled at the limit price when
        // the bar crosses it.
        if order.is_buy() {
            if low <= limit {
                return Some(Fill {
                    price: limit,
                    quantity: order.remaining_quantity(),
                });
            }
        } else if high >= limit {
            return Some(Fill {
                price: limit,
                quantity: order.remaining_quantity(),
            });
        }
        None
    }

    fn market_on_open_fill(
        &self,
        order: &Order,
        security: &Security,
        utc_time: DateTime<Utc>,
    ) -> Option<Fill> {
        let open_time = security
            .market_hours
            .next_market_open(order.created_utc, false)?;
        if utc_time <= open_time || security.open_price <= dec!(0) {
            return None;
        }
        Some(Fill {
            price: security.open_price,
            quantity: order.remaining_quantity(),
        })
    }

    fn market_on_close_fill(
        &self,
        order: &Order,
        security: &Security,
        utc_time: DateTime<Utc>,
    ) -> Option<Fill> {
        let close_time = security
            .market_hours
            .next_market_close(order.created_utc - Duration::seconds(1))?;
        if utc_time < close_time || !security.has_price() {
            return None;
        }
        Some(Fill {
            price: security.last_price,
            quantity: order.remaining_quantity(),
        })
    }
}
