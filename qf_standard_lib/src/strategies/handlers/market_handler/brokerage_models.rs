use crate::standardized_types::new_types::Price;
use crate::standardized_types::orders::{Order, OrderType};
use crate::standardized_types::securities::Security;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Policy governing whether an order may be placed at all, the fee schedule,
/// and per-security leverage. The simulated brokerage consults it before any
/// fill model runs.
pub trait BrokerageModel: Send + Sync {
    /// Validates order parameters at submission time. An error reason means
    /// the order is `Invalid` before it ever reaches the market.
    fn can_submit_order(&self, security: &Security, order: &Order) -> Result<(), String>;

    /// Whether the order may execute against the current market state.
    fn can_execute_order(&self, security: &Security, order: &Order) -> bool;

    fn order_fee(&self, security: &Security, quantity: Decimal, price: Price) -> Price;

    fn leverage(&self, security: &Security) -> Decimal;
}

/// Flat per-unit fee with a minimum, cash-account style leverage of 1 for
/// everything except forex.
pub struct DefaultBrokerageModel {
    pub fee_per_unit: Price,
    pub minimum_fee: Price,
}

impl Default for DefaultBrokerageModel {
    fn default() -> Self {
        DefaultBrokerageModel {
            fee_per_unit: dec!(0.005),
            minimum_fee: dec!(1),
        }
    }
}

impl BrokerageModel for DefaultBrokerageModel {
    fn can_submit_order(&self, _security: &Security, order: &Order) -> Result<(), String> {
        if order.quantity == dec!(0) {
            return Err("Order quantity cannot be zero".to_string());
        }
        match order.order_type {
            OrderType::Limit => {
                if order.limit_price.unwrap_or(dec!(0)) <= dec!(0) {
                    return Err("Limit orders require a positive limit price".to_string());
                }
            }
            OrderType::StopMarket => {
                if order.stop_price.unwrap_or(dec!(0)) <= dec!(0) {
                    return Err("Stop orders require a positive stop price".to_string());
                }
            }
            OrderType::StopLimit => {
                if order.limit_price.unwrap_or(dec!(0)) <= dec!(0)
                    || order.stop_price.unwrap_or(dec!(0)) <= dec!(0)
                {
                    return Err("Stop limit orders require positive stop and limit prices".to_string());
                }
            }
            OrderType::Market | OrderType::MarketOnOpen | OrderType::MarketOnClose => {}
        }
        Ok(())
    }

    fn can_execute_order(&self, security: &Security, _order: &Order) -> bool {
        security.has_price()
    }

    fn order_fee(&self, _security: &Security, quantity: Decimal, _price: Price) -> Price {
        (quantity.abs() * self.fee_per_unit).max(self.minimum_fee)
    }

    fn leverage(&self, security: &Security) -> Decimal {
        security.leverage.max(dec!(1))
    }
}
