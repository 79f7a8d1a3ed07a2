use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::{Price, Volume};
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A single trade print.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Tick {
    pub symbol: Symbol,
    pub price: Price,
    pub size: Volume,
    pub exchange: String,
    pub condition: String,
    pub suspicious: bool,
    pub time: DateTime<Utc>,
}

impl Tick {
    pub fn new(symbol: Symbol, price: Price, size: Volume, time: DateTime<Utc>) -> Self {
        Tick {
            symbol,
            price,
            size,
            exchange: String::new(),
            condition: String::new(),
            suspicious: false,
            time,
        }
    }
}

impl BaseData for Tick {
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
        self.price
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} x {} @ {}", self.symbol, self.size, self.price, self.time)
    }
}
