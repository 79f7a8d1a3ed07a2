use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_derive::{Deserialize, Serialize};

/// Corporate events. These are auxiliary data: they carry no bar period and
/// are exempt from the slice's `end_time == slice time` invariant checks.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Split {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub split_factor: Decimal,
    pub reference_price: Price,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Dividend {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub distribution: Price,
    pub reference_price: Price,
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub enum DelistingKind {
    Warning,
    Delisted,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Delisting {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub kind: DelistingKind,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct SymbolChanged {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub old_ticker: String,
    pub new_ticker: String,
}

impl BaseData for Split {
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
        self.reference_price
    }
}

impl BaseData for Dividend {
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
        self.distribution
    }
}

impl BaseData for Delisting {
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
        Price::ZERO
    }
}

impl BaseData for SymbolChanged {
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
        Price::ZERO
    }
}
