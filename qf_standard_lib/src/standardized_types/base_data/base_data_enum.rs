use crate::standardized_types::base_data::auxiliary::{Delisting, Dividend, Split, SymbolChanged};
use crate::standardized_types::base_data::base_data_type::BaseDataType;
use crate::standardized_types::base_data::custom::CustomData;
use crate::standardized_types::base_data::option_chain::{OptionChain, OptionContract};
use crate::standardized_types::base_data::quote_bar::QuoteBar;
use crate::standardized_types::base_data::tick::Tick;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A batch of points delivered as one item, used by universe subscriptions
/// whose coarse files carry many candidate symbols per instant.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct BaseDataCollection {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub items: Vec<BaseDataEnum>,
}

impl BaseData for BaseDataCollection {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    fn value(&self) -> Price {
        Price::ZERO
    }
}

/// The tagged sum over every data shape the feed can deliver. Replaces
/// virtual dispatch over a data class hierarchy: consumers match on the
/// variant they care about, shared field access goes through [`BaseData`].
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub enum BaseDataEnum {
    Tick(Tick),
    TradeBar(TradeBar),
    QuoteBar(QuoteBar),
    Split(Split),
    Dividend(Dividend),
    Delisting(Delisting),
    SymbolChanged(SymbolChanged),
    OptionContract(OptionContract),
    OptionChain(OptionChain),
    Custom(CustomData),
    Collection(BaseDataCollection),
}

impl BaseDataEnum {
    pub fn data_type(&self) -> BaseDataType {
        match self {
            BaseDataEnum::Tick(_) => BaseDataType::Ticks,
            BaseDataEnum::TradeBar(_) => BaseDataType::TradeBars,
            BaseDataEnum::QuoteBar(_) => BaseDataType::QuoteBars,
            BaseDataEnum::Split(_)
            | BaseDataEnum::Dividend(_)
            | BaseDataEnum::Delisting(_)
            | BaseDataEnum::SymbolChanged(_) => BaseDataType::Auxiliary,
            BaseDataEnum::OptionContract(_) | BaseDataEnum::OptionChain(_) => {
                BaseDataType::OptionContracts
            }
            BaseDataEnum::Custom(_) => BaseDataType::Custom,
            BaseDataEnum::Collection(_) => BaseDataType::Collections,
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            BaseDataEnum::TradeBar(bar) => bar.resolution,
            BaseDataEnum::QuoteBar(bar) => bar.resolution,
            _ => Resolution::Tick,
        }
    }

    /// Auxiliary items are exempt from the slice time invariant, they are
    /// delivered on the slice whose time first reaches their event time.
    pub fn is_auxiliary(&self) -> bool {
        matches!(
            self,
            BaseDataEnum::Split(_)
                | BaseDataEnum::Dividend(_)
                | BaseDataEnum::Delisting(_)
                | BaseDataEnum::SymbolChanged(_)
        )
    }

    pub fn is_fill_forward(&self) -> bool {
        match self {
            BaseDataEnum::TradeBar(bar) => bar.is_fill_forward,
            BaseDataEnum::QuoteBar(bar) => bar.is_fill_forward,
            _ => false,
        }
    }
}

impl BaseData for BaseDataEnum {
    fn symbol(&self) -> &Symbol {
        match self {
            BaseDataEnum::Tick(d) => d.symbol(),
            BaseDataEnum::TradeBar(d) => d.symbol(),
            BaseDataEnum::QuoteBar(d) => d.symbol(),
            BaseDataEnum::Split(d) => d.symbol(),
            BaseDataEnum::Dividend(d) => d.symbol(),
            BaseDataEnum::Delisting(d) => d.symbol(),
            BaseDataEnum::SymbolChanged(d) => d.symbol(),
            BaseDataEnum::OptionContract(d) => d.symbol(),
            BaseDataEnum::OptionChain(d) => d.symbol(),
            BaseDataEnum::Custom(d) => d.symbol(),
            BaseDataEnum::Collection(d) => d.symbol(),
        }
    }

    fn time(&self) -> DateTime<Utc> {
        match self {
            BaseDataEnum::Tick(d) => d.time(),
            BaseDataEnum::TradeBar(d) => d.time(),
            BaseDataEnum::QuoteBar(d) => d.time(),
            BaseDataEnum::Split(d) => d.time(),
            BaseDataEnum::Dividend(d) => d.time(),
            BaseDataEnum::Delisting(d) => d.time(),
            BaseDataEnum::SymbolChanged(d) => d.time(),
            BaseDataEnum::OptionContract(d) => d.time(),
            BaseDataEnum::OptionChain(d) => d.time(),
            BaseDataEnum::Custom(d) => d.time(),
            BaseDataEnum::Collection(d) => d.time(),
        }
    }

    fn end_time(&self) -> DateTime<Utc> {
        match self {
            BaseDataEnum::Tick(d) => d.end_time(),
            BaseDataEnum::TradeBar(d) => d.end_time(),
            BaseDataEnum::QuoteBar(d) => d.end_time(),
            BaseDataEnum::Split(d) => d.end_time(),
            BaseDataEnum::Dividend(d) => d.end_time(),
            BaseDataEnum::Delisting(d) => d.end_time(),
            BaseDataEnum::SymbolChanged(d) => d.end_time(),
            BaseDataEnum::OptionContract(d) => d.end_time(),
            BaseDataEnum::OptionChain(d) => d.end_time(),
            BaseDataEnum::Custom(d) => d.end_time(),
            BaseDataEnum::Collection(d) => d.end_time(),
        }
    }

    fn value(&self) -> Price {
        match self {
            BaseDataEnum::Tick(d) => d.value(),
            BaseDataEnum::TradeBar(d) => d.value(),
            BaseDataEnum::QuoteBar(d) => d.value(),
            BaseDataEnum::Split(d) => d.value(),
            BaseDataEnum::Dividend(d) => d.value(),
            BaseDataEnum::Delisting(d) => d.value(),
            BaseDataEnum::SymbolChanged(d) => d.value(),
            BaseDataEnum::OptionContract(d) => d.value(),
            BaseDataEnum::OptionChain(d) => d.value(),
            BaseDataEnum::Custom(d) => d.value(),
            BaseDataEnum::Collection(d) => d.value(),
        }
    }
}

impl fmt::Display for BaseDataEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}",
            self.data_type(),
            self.symbol(),
            self.end_time()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::symbols::SecurityIdentifier;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string())
    }

    #[test]
    fn bar_end_time_is_open_plus_resolution() {
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let bar = TradeBar::new(
            symbol(),
            dec!(150),
            dec!(151),
            dec!(149.5),
            dec!(150.5),
            dec!(10000),
            time,
            Resolution::Minute,
        );
        let data = BaseDataEnum::TradeBar(bar);
        assert_eq!(data.end_time(), time + chrono::Duration::minutes(1));
        assert_eq!(data.value(), dec!(150.5));
        assert!(!data.is_auxiliary());
    }

    #[test]
    fn fill_forward_bars_are_flagged_and_flat() {
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let bar = TradeBar::new(
            symbol(),
            dec!(150),
            dec!(151),
            dec!(149.5),
            dec!(150.5),
            dec!(10000),
            time,
            Resolution::Minute,
        );
        let ff = TradeBar::fill_forward(&bar, time + chrono::Duration::minutes(1));
        assert!(ff.is_fill_forward);
        assert_eq!(ff.open, bar.close);
        assert_eq!(ff.high, bar.close);
        assert_eq!(ff.low, bar.close);
        assert_eq!(ff.close, bar.close);
        assert_eq!(ff.volume, dec!(0));
    }

    #[test]
    fn auxiliary_items_report_auxiliary() {
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let split = BaseDataEnum::Split(Split {
            symbol: symbol(),
            time,
            split_factor: dec!(0.25),
            reference_price: dec!(600),
        });
        assert!(split.is_auxiliary());
        assert_eq!(split.data_type(), BaseDataType::Auxiliary);
    }
}
