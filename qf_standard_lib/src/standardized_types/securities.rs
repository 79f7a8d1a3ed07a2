use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::market_hours::MarketHours;
use crate::standardized_types::new_types::{CurrencyCode, Price, Volume};
use crate::standardized_types::subscriptions::SubscriptionId;
use crate::standardized_types::symbols::Symbol;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::sync::Arc;

/// Static trading properties of an instrument.
#[derive(Clone, Debug)]
pub struct SymbolProperties {
    pub quote_currency: CurrencyCode,
    pub lot_size: Volume,
    pub tick_size: Price,
    /// Multiplier from one unit of price movement to quote currency, 1 for
    /// equities, the contract multiplier for futures and options.
    pub contract_multiplier: Decimal,
}

impl SymbolProperties {
    pub fn default_equity() -> Self {
        SymbolProperties {
            quote_currency: "USD".to_string(),
            lot_size: dec!(1),
            tick_size: dec!(0.01),
            contract_multiplier: dec!(1),
        }
    }
}

/// Mutable market state of one subscribed instrument. Owned by the engine
/// thread, other components receive handles and read snapshots.
#[derive(Clone, Debug)]
pub struct Security {
    pub symbol: Symbol,
    pub market_hours: Arc<MarketHours>,
    pub properties: SymbolProperties,
    /// Subscriptions currently feeding this security, by handle.
    pub subscriptions: Vec<SubscriptionId>,
    pub leverage: Decimal,
    pub last_price: Price,
    pub bid_price: Price,
    pub ask_price: Price,
    pub open_price: Price,
    pub high_price: Price,
    pub low_price: Price,
    pub volume: Volume,
}

impl Security {
    pub fn new(symbol: Symbol, market_hours: Arc<MarketHours>, properties: SymbolProperties) -> Self {
        Security {
            symbol,
            market_hours,
            properties,
            subscriptions: Vec::new(),
            leverage: dec!(1),
            last_price: dec!(0),
            bid_price: dec!(0),
            ask_price: dec!(0),
            open_price: dec!(0),
            high_price: dec!(0),
            low_price: dec!(0),
            volume: dec!(0),
        }
    }

    pub fn has_price(&self) -> bool {
        self.last_price > dec!(0) || (self.bid_price > dec!(0) && self.ask_price > dec!(0))
    }

    /// The execution reference price for a signed quantity: the ask side for
    /// buys, the bid for sells, falling back to the last trade.
    pub fn market_price_for(&self, quantity: Decimal) -> Price {
        if quantity >= dec!(0) {
            if self.ask_price > dec!(0) {
                return self.ask_price;
            }
        } else if self.bid_price > dec!(0) {
            return self.bid_price;
        }
        self.last_price
    }

    /// Applies one data point to the live price state.
    pub fn update(&mut self, data: &BaseDataEnum) {
        match data {
            BaseDataEnum::Tick(tick) => {
                self.last_price = tick.price;
                self.volume += tick.size;
            }
            BaseDataEnum::TradeBar(bar) => {
                if !bar.is_fill_forward {
                    self.open_price = bar.open;
                    self.high_price = bar.high;
                    self.low_price = bar.low;
                    self.volume = bar.volume;
                }
                self.last_price = bar.close;
            }
            BaseDataEnum::QuoteBar(bar) => {
                self.bid_price = bar.bid.close;
                self.ask_price = bar.ask.close;
                if self.last_price == dec!(0) {
                    self.last_price = bar.mid_close();
                }
            }
            BaseDataEnum::OptionContract(contract) => {
                self.last_price = contract.last_price;
                self.bid_price = contract.bid;
                self.ask_price = contract.ask;
            }
            BaseDataEnum::Custom(custom) => {
                if custom.value > dec!(0) {
                    self.last_price = custom.value;
                }
            }
            _ => {}
        }
    }
}

/// Shared registry of live securities, keyed by symbol. Writes happen on the
/// engine thread only, handlers read through the map.
pub type SecurityMap = Arc<DashMap<Symbol, Security>>;

/// Universe selection output for one slice: the securities that entered and
/// left the algorithm's tradeable set.
#[derive(Clone, Debug, Default)]
pub struct SecurityChanges {
    pub added: Vec<Symbol>,
    pub removed: Vec<Symbol>,
}

impl SecurityChanges {
    pub fn none() -> Self {
        SecurityChanges::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn merge(&mut self, other: SecurityChanges) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

impl fmt::Display for SecurityChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SecurityChanges added: {:?} removed: {:?}",
            self.added.iter().map(|s| s.ticker.clone()).collect::<Vec<_>>(),
            self.removed.iter().map(|s| s.ticker.clone()).collect::<Vec<_>>()
        )
    }
}
