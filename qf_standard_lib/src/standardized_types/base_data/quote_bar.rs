use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::{Price, Volume};
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Bar {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

impl Bar {
    pub fn new(open: Price, high: Price, low: Price, close: Price) -> Self {
        Bar { open, high, low, close }
    }

    pub fn flat(price: Price) -> Self {
        Bar {
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }
}

/// A bid/ask sided bar. Mid prices are derived, not stored.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct QuoteBar {
    pub symbol: Symbol,
    pub bid: Bar,
    pub ask: Bar,
    pub bid_size: Volume,
    pub ask_size: Volume,
    pub time: DateTime<Utc>,
    pub resolution: Resolution,
    pub is_fill_forward: bool,
}

impl QuoteBar {
    pub fn new(
        symbol: Symbol,
        bid: Bar,
        ask: Bar,
        time: DateTime<Utc>,
        resolution: Resolution,
    ) -> Self {
        QuoteBar {
            symbol,
            bid,
            ask,
            bid_size: dec!(0),
            ask_size: dec!(0),
            time,
            resolution,
            is_fill_forward: false,
        }
    }

    pub fn mid_open(&self) -> Price {
        (self.bid.open + self.ask.open) / dec!(2)
    }

    pub fn mid_close(&self) -> Price {
        (self.bid.close + self.ask.close) / dec!(2)
    }

    pub fn fill_forward(previous: &QuoteBar, time: DateTime<Utc>) -> Self {
        QuoteBar {
            symbol: previous.symbol.clone(),
            bid: Bar::flat(previous.bid.close),
            ask: Bar::flat(previous.ask.close),
            bid_size: dec!(0),
            ask_size: dec!(0),
            time,
            resolution: previous.resolution,
            is_fill_forward: true,
        }
    }
}

impl BaseData for QuoteBar {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.time + self.resolution.as_duration()
    }

    fn value(&self) -> Price {
        self.mid_close()
    }
}
