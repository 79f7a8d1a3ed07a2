use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::{Price, Volume};
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// An OHLCV bar built from trades. `time` is the bar open, the bar becomes
/// known at `end_time = time + resolution`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct TradeBar {
    pub symbol: Symbol,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    pub time: DateTime<Utc>,
    pub resolution: Resolution,
    pub is_fill_forward: bool,
}

impl TradeBar {
    pub fn new(
        symbol: Symbol,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Volume,
        time: DateTime<Utc>,
        resolution: Resolution,
    ) -> Self {
        TradeBar {
            symbol,
            open,
            high,
            low,
            close,
            volume,
            time,
            resolution,
            is_fill_forward: false,
        }
    }

    /// A zero volume clone of the last bar carried forward to `time`, flagged
    /// so consumers can tell synthesized bars from real ones.
    pub fn fill_forward(previous: &TradeBar, time: DateTime<Utc>) -> Self {
        TradeBar {
            symbol: previous.symbol.clone(),
            open: previous.close,
            high: previous.close,
            low: previous.close,
            close: previous.close,
            volume: dec!(0),
            time,
            resolution: previous.resolution,
            is_fill_forward: true,
        }
    }
}

impl BaseData for TradeBar {
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
        self.close
    }
}

impl fmt::Display for TradeBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} O:{} H:{} L:{} C:{} V:{} @ {}",
            self.symbol, self.resolution, self.open, self.high, self.low, self.close, self.volume, self.time
        )
    }
}
