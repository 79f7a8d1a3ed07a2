use crate::standardized_types::new_types::{CurrencyCode, Price};
use crate::standardized_types::symbols::Symbol;
use ahash::AHashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// One currency balance. Non-base currencies carry a conversion security
/// whose last trade price drives the rate into the account currency.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Cash {
    pub currency: CurrencyCode,
    pub amount: Decimal,
    pub conversion_rate: Decimal,
    pub conversion_symbol: Option<Symbol>,
}

impl Cash {
    pub fn new(currency: CurrencyCode, amount: Decimal, conversion_rate: Decimal) -> Self {
        Cash {
            currency,
            amount,
            conversion_rate,
            conversion_symbol: None,
        }
    }

    pub fn value_in_account_currency(&self) -> Decimal {
        self.amount * self.conversion_rate
    }
}

impl fmt::Display for Cash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}", self.amount, self.currency, self.conversion_rate)
    }
}

/// Per currency balances with conversion handling. The base currency always
/// exists with rate 1.
#[derive(Clone, Debug)]
pub struct CashBook {
    base_currency: CurrencyCode,
    cash: AHashMap<CurrencyCode, Cash>,
}

impl CashBook {
    pub fn new(base_currency: &str, starting_cash: Decimal) -> Self {
        let base_currency = base_currency.to_uppercase();
        let mut cash = AHashMap::new();
        cash.insert(
            base_currency.clone(),
            Cash::new(base_currency.clone(), starting_cash, dec!(1)),
        );
        CashBook {
            base_currency,
            cash,
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn add_currency(
        &mut self,
        currency: &str,
        amount: Decimal,
        conversion_rate: Decimal,
        conversion_symbol: Option<Symbol>,
    ) {
        let currency = currency.to_uppercase();
        self.cash.insert(
            currency.clone(),
            Cash {
                currency,
                amount,
                conversion_rate,
                conversion_symbol,
            },
        );
    }

    pub fn get(&self, currency: &str) -> Option<&Cash> {
        self.cash.get(&currency.to_uppercase())
    }

    /// Adjusts a balance, creating the entry at rate zero if unseen. A zero
    /// rate keeps an unpriced currency out of the total until its conversion
    /// security trades.
    pub fn adjust(&mut self, currency: &str, delta: Decimal) {
        let currency = currency.to_uppercase();
        let rate = if currency == self.base_currency { dec!(1) } else { dec!(0) };
        self.cash
            .entry(currency.clone())
            .or_insert_with(|| Cash::new(currency, dec!(0), rate))
            .amount += delta;
    }

    /// Converts an amount in the given currency into base currency using the
    /// book's current rate.
    pub fn convert_to_base(&self, currency: &str, amount: Decimal) -> Decimal {
        let currency = currency.to_uppercase();
        if currency == self.base_currency {
            return amount;
        }
        match self.cash.get(&currency) {
            Some(cash) => amount * cash.conversion_rate,
            None => amount,
        }
    }

    /// Updates every conversion rate driven by the given security's latest
    /// trade price. Returns the currencies that changed.
    pub fn update_conversion_rate(&mut self, symbol: &Symbol, price: Price) -> Vec<CurrencyCode> {
        let mut updated = Vec::new();
        for cash in self.cash.values_mut() {
            if cash.conversion_symbol.as_ref() == Some(symbol) {
                cash.conversion_rate = price;
                updated.push(cash.currency.clone());
            }
        }
        updated
    }

    /// The symbols whose prices drive conversion rates in this book.
    pub fn conversion_symbols(&self) -> Vec<Symbol> {
        self.cash
            .values()
            .filter_map(|c| c.conversion_symbol.clone())
            .collect()
    }

    pub fn total_value_in_base(&self) -> Decimal {
        self.cash.values().map(|c| c.value_in_account_currency()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cash> {
        self.cash.values()
    }
}
