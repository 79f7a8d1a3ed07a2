use crate::standardized_types::base_data::auxiliary::{Delisting, Dividend, Split, SymbolChanged};
use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::base_data::custom::CustomData;
use crate::standardized_types::base_data::option_chain::OptionChain;
use crate::standardized_types::base_data::quote_bar::QuoteBar;
use crate::standardized_types::base_data::tick::Tick;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::securities::SecurityChanges;
use crate::standardized_types::symbols::Symbol;
use ahash::AHashMap;
use chrono::{DateTime, Utc};

/// The typed views over one instant's data. Ticks accept multiple entries per
/// symbol in feed order, bar maps hold one entry per symbol, last one wins.
#[derive(Clone, Debug, Default)]
pub struct Slice {
    pub ticks: AHashMap<Symbol, Vec<Tick>>,
    pub trade_bars: AHashMap<Symbol, TradeBar>,
    pub quote_bars: AHashMap<Symbol, QuoteBar>,
    pub splits: AHashMap<Symbol, Split>,
    pub dividends: AHashMap<Symbol, Dividend>,
    pub delistings: AHashMap<Symbol, Delisting>,
    pub symbol_changes: AHashMap<Symbol, SymbolChanged>,
    pub option_chains: AHashMap<Symbol, OptionChain>,
    pub custom: Vec<CustomData>,
}

impl Slice {
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.ticks.contains_key(symbol)
            || self.trade_bars.contains_key(symbol)
            || self.quote_bars.contains_key(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
            && self.trade_bars.is_empty()
            && self.quote_bars.is_empty()
            && self.splits.is_empty()
            && self.dividends.is_empty()
            && self.delistings.is_empty()
            && self.symbol_changes.is_empty()
            && self.option_chains.is_empty()
            && self.custom.is_empty()
    }
}

/// One synchronized step of the pipeline: the algorithm-visible `slice` plus
/// the engine's precomputed update vectors. `utc_time` is strictly increasing
/// across the emitted sequence, every non-auxiliary item's `end_time` equals
/// it.
#[derive(Clone, Debug)]
pub struct TimeSlice {
    pub utc_time: DateTime<Utc>,
    pub slice: Slice,
    data: Vec<BaseDataEnum>,
    /// Conversion-security prices for the cash book, `(symbol, close)`.
    pub cash_updates: Vec<(Symbol, Price)>,
    /// Latest price per symbol this instant, internal feeds included.
    pub security_updates: Vec<(Symbol, Price)>,
    /// Bars closed by consolidators at this instant.
    pub consolidator_updates: Vec<BaseDataEnum>,
    pub security_changes: SecurityChanges,
}

impl TimeSlice {
    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BaseDataEnum> {
        self.data.iter()
    }
}

/// Accumulates the items gathered at one instant and finalizes them into a
/// `TimeSlice`. Ordering in `data` is stable: sorted by (symbol identity,
/// resolution), same-symbol ticks keep their feed order.
pub struct TimeSliceBuilder {
    time: DateTime<Utc>,
    items: Vec<(BaseDataEnum, bool)>,
    cash_updates: Vec<(Symbol, Price)>,
    consolidator_updates: Vec<BaseDataEnum>,
    security_changes: SecurityChanges,
}

impl TimeSliceBuilder {
    pub fn new(time: DateTime<Utc>) -> Self {
        TimeSliceBuilder {
            time,
            items: Vec::new(),
            cash_updates: Vec::new(),
            consolidator_updates: Vec::new(),
            security_changes: SecurityChanges::none(),
        }
    }

    /// Internal-feed items update securities and cash but never reach the
    /// algorithm's slice views.
    pub fn add(&mut self, data: BaseDataEnum, is_internal: bool) {
        self.items.push((data, is_internal));
    }

    pub fn add_cash_update(&mut self, symbol: Symbol, price: Price) {
        self.cash_updates.push((symbol, price));
    }

    pub fn add_consolidator_update(&mut self, data: BaseDataEnum) {
        self.consolidator_updates.push(data);
    }

    pub fn set_security_changes(&mut self, changes: SecurityChanges) {
        self.security_changes = changes;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.consolidator_updates.is_empty()
            && self.security_changes.is_empty()
    }

    pub fn build(mut self) -> TimeSlice {
        // Stable sort preserves the feed order of same-key ticks.
        self.items
            .sort_by(|(a, _), (b, _)| (a.symbol().sid.clone(), a.resolution())
                .cmp(&(b.symbol().sid.clone(), b.resolution())));

        let mut slice = Slice::default();
        let mut data = Vec::with_capacity(self.items.len());
        let mut security_updates: AHashMap<Symbol, Price> = AHashMap::new();
        let mut chains: AHashMap<Symbol, OptionChain> = AHashMap::new();

        for (item, is_internal) in self.items {
            if item.value() > Price::ZERO {
                security_updates.insert(item.symbol().clone(), item.value());
            }
            if is_internal {
                continue;
            }
            match item {
                BaseDataEnum::Tick(tick) => {
                    slice.ticks.entry(tick.symbol.clone()).or_default().push(tick.clone());
                    data.push(BaseDataEnum::Tick(tick));
                }
                BaseDataEnum::TradeBar(bar) => {
                    slice.trade_bars.insert(bar.symbol.clone(), bar.clone());
                    data.push(BaseDataEnum::TradeBar(bar));
                }
                BaseDataEnum::QuoteBar(bar) => {
                    slice.quote_bars.insert(bar.symbol.clone(), bar.clone());
                    data.push(BaseDataEnum::QuoteBar(bar));
                }
                BaseDataEnum::Split(split) => {
                    slice.splits.insert(split.symbol.clone(), split.clone());
                    data.push(BaseDataEnum::Split(split));
                }
                BaseDataEnum::Dividend(dividend) => {
                    slice.dividends.insert(dividend.symbol.clone(), dividend.clone());
                    data.push(BaseDataEnum::Dividend(dividend));
                }
                BaseDataEnum::Delisting(delisting) => {
                    slice.delistings.insert(delisting.symbol.clone(), delisting.clone());
                    data.push(BaseDataEnum::Delisting(delisting));
                }
                BaseDataEnum::SymbolChanged(changed) => {
                    slice.symbol_changes.insert(changed.symbol.clone(), changed.clone());
                    data.push(BaseDataEnum::SymbolChanged(changed));
                }
                BaseDataEnum::OptionContract(contract) => {
                    let canonical = contract.symbol.canonical();
                    chains
                        .entry(canonical.clone())
                        .or_insert_with(|| OptionChain::new(canonical, self.time))
                        .add_contract(contract);
                }
                BaseDataEnum::OptionChain(chain) => {
                    slice.option_chains.insert(chain.canonical_symbol.clone(), chain.clone());
                    data.push(BaseDataEnum::OptionChain(chain));
                }
                BaseDataEnum::Custom(custom) => {
                    slice.custom.push(custom.clone());
                    data.push(BaseDataEnum::Custom(custom));
                }
                BaseDataEnum::Collection(collection) => {
                    data.push(BaseDataEnum::Collection(collection));
                }
            }
        }

        let mut chains: Vec<(Symbol, OptionChain)> = chains.into_iter().collect();
        chains.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (canonical, chain) in chains {
            slice.option_chains.insert(canonical, chain.clone());
            data.push(BaseDataEnum::OptionChain(chain));
        }

        let mut security_updates: Vec<(Symbol, Price)> = security_updates.into_iter().collect();
        security_updates.sort_by(|(a, _), (b, _)| a.cmp(b));

        TimeSlice {
            utc_time: self.time,
            slice,
            data,
            cash_updates: self.cash_updates,
            security_updates,
            consolidator_updates: self.consolidator_updates,
            security_changes: self.security_changes,
        }
    }
}
