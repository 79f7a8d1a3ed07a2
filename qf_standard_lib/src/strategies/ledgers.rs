use crate::errors::EngineError;
use crate::standardized_types::accounts::{Cash, CashBook};
use crate::standardized_types::new_types::Price;
use crate::standardized_types::orders::OrderEvent;
use crate::standardized_types::positions::Holding;
use crate::standardized_types::securities::SymbolProperties;
use crate::standardized_types::symbols::Symbol;
use ahash::AHashMap;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

/// Read-only copy of the book handed out for queries, the live ledger never
/// leaves the engine thread.
#[derive(Clone, Debug)]
pub struct LedgerSnapshot {
    pub cash: Vec<Cash>,
    pub holdings: Vec<Holding>,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub total_portfolio_value: Decimal,
}

/// Aggregate holdings and cash. Single writer: every mutation happens on the
/// engine thread through the transaction handler's fill application.
pub struct Ledger {
    cash_book: CashBook,
    holdings: AHashMap<Symbol, Holding>,
    realized_pnl: Decimal,
    total_fees: Decimal,
}

impl Ledger {
    pub fn new(base_currency: &str, starting_cash: Decimal) -> Self {
        Ledger {
            cash_book: CashBook::new(base_currency, starting_cash),
            holdings: AHashMap::new(),
            realized_pnl: dec!(0),
            total_fees: dec!(0),
        }
    }

    pub fn cash_book(&self) -> &CashBook {
        &self.cash_book
    }

    pub fn cash_book_mut(&mut self) -> &mut CashBook {
        &mut self.cash_book
    }

    pub fn holding(&self, symbol: &Symbol) -> Option<&Holding> {
        self.holdings.get(symbol)
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.values()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn total_fees(&self) -> Decimal {
        self.total_fees
    }

    pub fn is_long(&self, symbol: &Symbol) -> bool {
        self.holdings.get(symbol).map_or(false, |h| h.is_long())
    }

    pub fn is_short(&self, symbol: &Symbol) -> bool {
        self.holdings.get(symbol).map_or(false, |h| h.is_short())
    }

    pub fn quantity(&self, symbol: &Symbol) -> Decimal {
        self.holdings.get(symbol).map_or(dec!(0), |h| h.quantity)
    }

    /// Marks a holding to the latest trade price.
    pub fn update_market_price(&mut self, symbol: &Symbol, price: Price) {
        if let Some(holding) = self.holdings.get_mut(symbol) {
            holding.market_price = price;
        }
    }

    /// `cash + Σ holdings market value`, everything converted to the account
    /// currency. Holds as an invariant after every slice.
    pub fn total_portfolio_value(&self) -> Decimal {
        let holdings_value: Decimal = self
            .holdings
            .values()
            .map(|h| {
                self.cash_book
                    .convert_to_base(&h.properties.quote_currency, h.market_value())
            })
            .sum();
        self.cash_book.total_value_in_base() + holdings_value
    }

    /// Margin consumed by open positions at the given leverage per symbol.
    pub fn total_margin_used(&self, leverage_of: impl Fn(&Symbol) -> Decimal) -> Decimal {
        self.holdings
            .values()
            .map(|h| {
                let leverage = leverage_of(&h.symbol).max(dec!(1));
                self.cash_book
                    .convert_to_base(&h.properties.quote_currency, h.absolute_market_value())
                    / leverage
            })
            .sum()
    }

    pub fn margin_remaining(&self, leverage_of: impl Fn(&Symbol) -> Decimal) -> Decimal {
        self.total_portfolio_value() - self.total_margin_used(leverage_of)
    }

    /// Applies one fill to holdings and cash. All failure checks run before
    /// any mutation, a returned error leaves the book untouched.
    ///
    /// Sign reversals close the prior position at the fill price, realize
    /// its P&L, and open the opposite position at the fill price for the
    /// remaining quantity. Cash moves by `-qty * price * multiplier` in the
    /// quote currency, fees come out of account cash.
    pub fn apply_fill(
        &mut self,
        event: &OrderEvent,
        properties: &SymbolProperties,
    ) -> Result<(), EngineError> {
        let quantity = event.fill_quantity;
        let price = event.fill_price;
        if quantity == dec!(0) {
            return Ok(());
        }
        if price <= dec!(0) {
            return Err(EngineError::Order(format!(
                "Order #{}: fill at non-positive price {}",
                event.order_id, price
            )));
        }

        let multiplier = properties.contract_multiplier;
        let holding = self
            .holdings
            .entry(event.symbol.clone())
            .or_insert_with(|| Holding::new(event.symbol.clone(), properties.clone()));

        let old_quantity = holding.quantity;
        let new_quantity = old_quantity + quantity;
        let crossed = old_quantity != dec!(0)
            && new_quantity != dec!(0)
            && old_quantity.signum() != new_quantity.signum();

        if old_quantity == dec!(0) || old_quantity.signum() == quantity.signum() {
            // Opening or adding: weighted average cost.
            holding.average_price = crate::helpers::decimal_calculators::weighted_average_price(
                old_quantity.abs(),
                holding.average_price,
                quantity.abs(),
                price,
            );
        } else if crossed {
            // Close the whole prior position at the fill price, flip the
            // remainder at the fill price.
            self.realized_pnl += old_quantity * (price - holding.average_price) * multiplier;
            holding.average_price = price;
        } else {
            // Reducing: realize the closed fraction, cost basis unchanged.
            let closed = quantity.abs().min(old_quantity.abs()) * old_quantity.signum();
            self.realized_pnl += closed * (price - holding.average_price) * multiplier;
            if new_quantity == dec!(0) {
                holding.average_price = dec!(0);
            }
        }

        holding.quantity = new_quantity;
        holding.market_price = price;

        let quote_currency = properties.quote_currency.clone();
        self.cash_book
            .adjust(&quote_currency, -quantity * price * multiplier);
        if event.order_fee > dec!(0) {
            let base = self.cash_book.base_currency().to_string();
            self.cash_book.adjust(&base, -event.order_fee);
            self.total_fees += event.order_fee;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut holdings: Vec<Holding> = self.holdings.values().cloned().collect();
        holdings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let mut cash: Vec<Cash> = self.cash_book.iter().cloned().collect();
        cash.sort_by(|a, b| a.currency.cmp(&b.currency));
        LedgerSnapshot {
            cash,
            holdings,
            realized_pnl: self.realized_pnl,
            total_fees: self.total_fees,
            total_portfolio_value: self.total_portfolio_value(),
        }
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ledger value: {} realized: {} fees: {}",
            self.total_portfolio_value(),
            self.realized_pnl,
            self.total_fees
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::orders::OrderStatus;
    use crate::standardized_types::symbols::SecurityIdentifier;
    use chrono::{TimeZone, Utc};

    fn symbol() -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string())
    }

    fn fill(quantity: Decimal, price: Price, fee: Price) -> OrderEvent {
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap();
        let mut event = OrderEvent::new(1, symbol(), time, OrderStatus::Filled)
            .with_fill(quantity, price);
        event.order_fee = fee;
        event
    }

    #[test]
    fn buy_moves_cash_exactly() {
        let mut ledger = Ledger::new("USD", dec!(100_000));
        ledger
            .apply_fill(&fill(dec!(10), dec!(150), dec!(1)), &SymbolProperties::default_equity())
            .unwrap();
        let holding = ledger.holding(&symbol()).unwrap();
        assert_eq!(holding.quantity, dec!(10));
        assert_eq!(holding.average_price, dec!(150));
        assert_eq!(
            ledger.cash_book().get("USD").unwrap().amount,
            dec!(100_000) - dec!(1500) - dec!(1)
        );
        // cash + holdings market value = starting cash - fee
        assert_eq!(ledger.total_portfolio_value(), dec!(100_000) - dec!(1));
    }

    #[test]
    fn adding_uses_weighted_average() {
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let props = SymbolProperties::default_equity();
        ledger.apply_fill(&fill(dec!(10), dec!(100), dec!(0)), &props).unwrap();
        ledger.apply_fill(&fill(dec!(10), dec!(110), dec!(0)), &props).unwrap();
        let holding = ledger.holding(&symbol()).unwrap();
        assert_eq!(holding.quantity, dec!(20));
        assert_eq!(holding.average_price, dec!(105));
        assert_eq!(ledger.realized_pnl(), dec!(0));
    }

    #[test]
    fn reducing_realizes_pnl() {
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let props = SymbolProperties::default_equity();
        ledger.apply_fill(&fill(dec!(10), dec!(100), dec!(0)), &props).unwrap();
        ledger.apply_fill(&fill(dec!(-4), dec!(110), dec!(0)), &props).unwrap();
        let holding = ledger.holding(&symbol()).unwrap();
        assert_eq!(holding.quantity, dec!(6));
        assert_eq!(holding.average_price, dec!(100));
        assert_eq!(ledger.realized_pnl(), dec!(40));
    }

    #[test]
    fn sign_reversal_closes_and_reopens() {
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let props = SymbolProperties::default_equity();
        ledger.apply_fill(&fill(dec!(10), dec!(100), dec!(0)), &props).unwrap();
        // Sell 15: close 10 long at 110 (+100 realized), open 5 short at 110.
        ledger.apply_fill(&fill(dec!(-15), dec!(110), dec!(0)), &props).unwrap();
        let holding = ledger.holding(&symbol()).unwrap();
        assert_eq!(holding.quantity, dec!(-5));
        assert_eq!(holding.average_price, dec!(110));
        assert_eq!(ledger.realized_pnl(), dec!(100));
    }

    #[test]
    fn invalid_fill_leaves_book_untouched() {
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let props = SymbolProperties::default_equity();
        let result = ledger.apply_fill(&fill(dec!(10), dec!(0), dec!(0)), &props);
        assert!(result.is_err());
        assert!(ledger.holding(&symbol()).is_none());
        assert_eq!(ledger.total_portfolio_value(), dec!(100_000));
    }

    #[test]
    fn margin_accounting() {
        let mut ledger = Ledger::new("USD", dec!(10_000));
        let props = SymbolProperties::default_equity();
        ledger.apply_fill(&fill(dec!(40), dec!(100), dec!(0)), &props).unwrap();
        // 4000 position at 2x leverage consumes 2000 margin.
        assert_eq!(ledger.total_margin_used(|_| dec!(2)), dec!(2000));
        assert_eq!(ledger.margin_remaining(|_| dec!(2)), dec!(8000));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let props = SymbolProperties::default_equity();
        ledger.apply_fill(&fill(dec!(10), dec!(150), dec!(0)), &props).unwrap();
        let snapshot = ledger.snapshot();
        ledger.apply_fill(&fill(dec!(10), dec!(150), dec!(0)), &props).unwrap();
        assert_eq!(snapshot.holdings[0].quantity, dec!(10));
        assert_eq!(ledger.holding(&symbol()).unwrap().quantity, dec!(20));
    }
}
