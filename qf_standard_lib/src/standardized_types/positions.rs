use crate::standardized_types::new_types::Price;
use crate::standardized_types::securities::SymbolProperties;
use crate::standardized_types::symbols::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

/// A signed holding in one instrument. Negative quantity is a short. Carries
/// the instrument's static properties so valuation needs no registry lookup.
#[derive(Clone, Debug)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub average_price: Price,
    pub market_price: Price,
    pub properties: SymbolProperties,
}

impl Holding {
    pub fn new(symbol: Symbol, properties: SymbolProperties) -> Self {
        Holding {
            symbol,
            quantity: dec!(0),
            average_price: dec!(0),
            market_price: dec!(0),
            properties,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > dec!(0)
    }

    pub fn is_short(&self) -> bool {
        self.quantity < dec!(0)
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == dec!(0)
    }

    /// Signed market value in the instrument's quote currency.
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.market_price * self.properties.contract_multiplier
    }

    pub fn absolute_market_value(&self) -> Decimal {
        self.market_value().abs()
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_price * self.properties.contract_multiplier
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.quantity * (self.market_price - self.average_price) * self.properties.contract_multiplier
    }
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} @ {} (market: {})",
            self.symbol, self.quantity, self.average_price, self.market_price
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::symbols::SecurityIdentifier;

    fn holding(quantity: Decimal, average: Price, market: Price) -> Holding {
        let mut h = Holding::new(
            Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string()),
            SymbolProperties::default_equity(),
        );
        h.quantity = quantity;
        h.average_price = average;
        h.market_price = market;
        h
    }

    #[test]
    fn long_pnl() {
        let h = holding(dec!(10), dec!(150), dec!(155));
        assert!(h.is_long());
        assert_eq!(h.market_value(), dec!(1550));
        assert_eq!(h.unrealized_pnl(), dec!(50));
    }

    #[test]
    fn short_pnl() {
        let h = holding(dec!(-10), dec!(150), dec!(145));
        assert!(h.is_short());
        assert_eq!(h.market_value(), dec!(-1450));
        assert_eq!(h.unrealized_pnl(), dec!(50));
    }
}
