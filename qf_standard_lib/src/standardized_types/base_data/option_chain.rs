use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::enums::OptionRight;
use crate::standardized_types::new_types::{Price, Volume};
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde_derive::{Deserialize, Serialize};

/// Snapshot of a single option contract as yielded by an options
/// subscription. Individual contracts are aggregated into an `OptionChain`
/// keyed by the underlying's canonical symbol during slice construction.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct OptionContract {
    pub symbol: Symbol,
    pub underlying_price: Price,
    pub last_price: Price,
    pub bid: Price,
    pub ask: Price,
    pub volume: Volume,
    pub open_interest: Volume,
    pub time: DateTime<Utc>,
}

impl OptionContract {
    /// Intrinsic value at the recorded underlying price. The theoretical
    /// price is evaluated lazily, only callers that want it pay for it.
    pub fn intrinsic_value(&self) -> Price {
        let strike = self.symbol.sid.strike();
        let value = match self.symbol.sid.option_right() {
            OptionRight::Call => self.underlying_price - strike,
            OptionRight::Put => strike - self.underlying_price,
        };
        value.max(dec!(0))
    }
}

impl BaseData for OptionContract {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.time
    }

    fn value(&self) -> Price {
        self.last_price
    }
}

/// All contracts for one underlying that arrived in a single slice, grouped
/// under the canonical option symbol.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct OptionChain {
    pub canonical_symbol: Symbol,
    pub time: DateTime<Utc>,
    pub underlying_price: Price,
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    pub fn new(canonical_symbol: Symbol, time: DateTime<Utc>) -> Self {
        OptionChain {
            canonical_symbol,
            time,
            underlying_price: dec!(0),
            contracts: Vec::new(),
        }
    }

    pub fn add_contract(&mut self, contract: OptionContract) {
        if self.underlying_price == dec!(0) {
            self.underlying_price = contract.underlying_price;
        }
        self.contracts.push(contract);
    }

    pub fn calls(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.symbol.sid.option_right() == OptionRight::Call)
    }

    pub fn puts(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.symbol.sid.option_right() == OptionRight::Put)
    }
}

impl BaseData for OptionChain {
    fn symbol(&self) -> &Symbol {
        &self.canonical_symbol
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.time
    }

    fn value(&self) -> Price {
        self.underlying_price
    }
}
