use crate::standardized_types::base_data::base_data_enum::{BaseDataCollection, BaseDataEnum};
use crate::standardized_types::base_data::quote_bar::QuoteBar;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::market_hours::MarketHours;
use crate::standardized_types::securities::SecurityChanges;
use crate::standardized_types::subscriptions::{SubscriptionDataConfig, SubscriptionId};
use crate::standardized_types::symbols::Symbol;
use crate::standardized_types::time_slices::{TimeSlice, TimeSliceBuilder};
use crate::market_data::sources::{DataSource, SourcePoll};
use crate::strategies::universe::{Universe, UniverseSelector};
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;

/// Builds the subscription for a universe-selected symbol: config, source
/// positioned at or after the given UTC instant, and the exchange hours.
pub type SubscriptionFactory = Box<
    dyn FnMut(&Symbol, DateTime<Utc>) -> Option<(SubscriptionDataConfig, Box<dyn DataSource>, Arc<MarketHours>)>
        + Send,
>;

/// One result of asking the feed for the next slice.
pub enum FeedPoll {
    Slice(TimeSlice),
    /// Live mode: sources had nothing buffered, ask again later.
    Pending,
    /// Every subscription is exhausted or the end date was reached.
    Done,
}

/// A single lazy, finite, non-restartable stream of data points bound to one
/// (instrument, resolution, type) tuple, rooted at a UTC frontier.
struct Subscription {
    id: SubscriptionId,
    config: SubscriptionDataConfig,
    source: Box<dyn DataSource>,
    front: Option<BaseDataEnum>,
    current_end_utc: DateTime<Utc>,
    removed: bool,
    exhausted: bool,
    not_ready: bool,
    consecutive_failures: u8,
    market_hours: Arc<MarketHours>,
    is_universe: bool,
    /// The last real bar seen, the template for synthesized bars.
    last_bar: Option<BaseDataEnum>,
    /// Next instant on the exchange cadence a fill-forward bar would close.
    next_fill_forward_end: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Advances the source until a usable front item is buffered. Items that
    /// run backwards violate the subscription contract and are dropped.
    fn refill_front(&mut self, failure_limit: u8) {
        self.not_ready = false;
        while self.front.is_none() && !self.exhausted {
            match self.source.next() {
                Ok(SourcePoll::Data(item)) => {
                    if item.end_time() < self.current_end_utc {
                        warn!(
                            "{}: dropping out-of-order item at {} (frontier {})",
                            self.config,
                            item.end_time(),
                            self.current_end_utc
                        );
                        continue;
                    }
                    self.consecutive_failures = 0;
                    self.front = Some(item);
                }
                Ok(SourcePoll::NotReady) => {
                    self.not_ready = true;
                    return;
                }
                Ok(SourcePoll::End) => {
                    self.exhausted = true;
                }
                Err(e) => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    warn!(
                        "{}: read failure {}/{}: {}",
                        self.config, self.consecutive_failures, failure_limit, e
                    );
                    if self.consecutive_failures >= failure_limit {
                        warn!("{}: deactivated after repeated failures", self.config);
                        self.exhausted = true;
                    }
                }
            }
        }
    }

    fn front_time(&self) -> Option<DateTime<Utc>> {
        self.front.as_ref().map(|f| f.end_time())
    }

    /// The earliest instant this subscription wants the next slice at:
    /// its real front, or an earlier fill-forward close on the exchange
    /// cadence while the front is still ahead.
    fn effective_time(&self) -> Option<DateTime<Utc>> {
        match (self.front_time(), self.fill_forward_time()) {
            (Some(real), Some(ff)) => Some(real.min(ff)),
            (Some(real), None) => Some(real),
            // Fill forward only runs while the stream is alive, an exhausted
            // subscription stops synthesizing.
            (None, _) => None,
        }
    }

    fn fill_forward_time(&self) -> Option<DateTime<Utc>> {
        if !self.config.fill_forward || self.last_bar.is_none() {
            return None;
        }
        self.next_fill_forward_end
    }

    fn remember_bar(&mut self, item: &BaseDataEnum, slice_time: DateTime<Utc>) {
        match item {
            BaseDataEnum::TradeBar(bar) if !bar.is_fill_forward => {
                self.last_bar = Some(item.clone());
                self.advance_fill_forward(slice_time);
            }
            BaseDataEnum::QuoteBar(bar) if !bar.is_fill_forward => {
                self.last_bar = Some(item.clone());
                self.advance_fill_forward(slice_time);
            }
            _ => {}
        }
    }

    fn advance_fill_forward(&mut self, after: DateTime<Utc>) {
        if !self.config.fill_forward {
            return;
        }
        self.next_fill_forward_end = self.market_hours.next_bar_end(
            after,
            self.config.resolution,
            self.config.extended_hours,
        );
    }

    fn synthesize_fill_forward(&mut self, slice_time: DateTime<Utc>) -> Option<BaseDataEnum> {
        let open_time = slice_time - self.config.resolution.as_duration();
        let synthesized = match self.last_bar.as_ref()? {
            BaseDataEnum::TradeBar(bar) => {
                BaseDataEnum::TradeBar(TradeBar::fill_forward(bar, open_time))
            }
            BaseDataEnum::QuoteBar(bar) => {
                BaseDataEnum::QuoteBar(QuoteBar::fill_forward(bar, open_time))
            }
            _ => return None,
        };
        self.advance_fill_forward(slice_time);
        Some(synthesized)
    }
}

/// Merges every active subscription into a single stream of strictly
/// increasing `TimeSlice`s, running universe selection between slices and
/// honoring subscription add/remove mid stream.
pub struct DataFeed {
    subscriptions: AHashMap<SubscriptionId, Subscription>,
    ordered_ids: Vec<SubscriptionId>,
    universes: AHashMap<SubscriptionId, Universe>,
    next_subscription_id: u64,
    end_utc: DateTime<Utc>,
    previous_slice_time: Option<DateTime<Utc>>,
    data_failure_limit: u8,
    conversion_symbols: AHashSet<Symbol>,
    subscription_factory: Option<SubscriptionFactory>,
}

impl DataFeed {
    pub fn new(end_utc: DateTime<Utc>, data_failure_limit: u8) -> Self {
        DataFeed {
            subscriptions: AHashMap::new(),
            ordered_ids: Vec::new(),
            universes: AHashMap::new(),
            next_subscription_id: 1,
            end_utc,
            previous_slice_time: None,
            data_failure_limit,
            conversion_symbols: AHashSet::new(),
            subscription_factory: None,
        }
    }

    pub fn set_subscription_factory(&mut self, factory: SubscriptionFactory) {
        self.subscription_factory = Some(factory);
    }

    /// Registers a conversion security: its closes are reported through
    /// `cash_updates` so the cash book can track exchange rates.
    pub fn register_conversion_symbol(&mut self, symbol: Symbol) {
        self.conversion_symbols.insert(symbol);
    }

    pub fn add_subscription(
        &mut self,
        config: SubscriptionDataConfig,
        source: Box<dyn DataSource>,
        market_hours: Arc<MarketHours>,
        start_utc: DateTime<Utc>,
    ) -> SubscriptionId {
        self.insert_subscription(config, source, market_hours, start_utc, false)
    }

    pub fn add_universe(
        &mut self,
        name: &str,
        config: SubscriptionDataConfig,
        source: Box<dyn DataSource>,
        market_hours: Arc<MarketHours>,
        start_utc: DateTime<Utc>,
        selector: UniverseSelector,
    ) -> SubscriptionId {
        let id = self.insert_subscription(config, source, market_hours, start_utc, true);
        self.universes.insert(id, Universe::new(name, id, selector));
        id
    }

    fn insert_subscription(
        &mut self,
        config: SubscriptionDataConfig,
        source: Box<dyn DataSource>,
        market_hours: Arc<MarketHours>,
        start_utc: DateTime<Utc>,
        is_universe: bool,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id);
        self.next_subscription_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                config,
                source,
                front: None,
                current_end_utc: start_utc,
                removed: false,
                exhausted: false,
                not_ready: false,
                consecutive_failures: 0,
                market_hours,
                is_universe,
                last_bar: None,
                next_fill_forward_end: None,
            },
        );
        self.ordered_ids.push(id);
        id
    }

    /// Marks a subscription for removal. It will not contribute to any
    /// subsequent slice.
    pub fn remove_subscription(&mut self, id: SubscriptionId) {
        if let Some(subscription) = self.subscriptions.get_mut(&id) {
            subscription.removed = true;
        }
        self.universes.remove(&id);
    }

    pub fn remove_symbol_subscriptions(&mut self, symbol: &Symbol) {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .values()
            .filter(|s| &s.config.symbol == symbol && !s.config.is_internal_feed)
            .map(|s| s.id)
            .collect();
        for id in ids {
            self.remove_subscription(id);
        }
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|s| !s.removed && !s.exhausted)
            .count()
    }

    /// The merge step: emits the next slice keyed at the minimum effective
    /// front time across the active set, strictly greater than the previous
    /// slice's time, clamped to the configured end date.
    pub fn next_slice(&mut self) -> FeedPoll {
        loop {
            self.prune();
            if self.subscriptions.is_empty() {
                return FeedPoll::Done;
            }

            // Refill fronts, then find the earliest instant anyone wants.
            let mut slice_time: Option<DateTime<Utc>> = None;
            let mut any_not_ready = false;
            for id in self.ordered_ids.clone() {
                let Some(subscription) = self.subscriptions.get_mut(&id) else {
                    continue;
                };
                if subscription.front.is_none() {
                    subscription.refill_front(self.data_failure_limit);
                }
                any_not_ready |= subscription.not_ready;
                if let Some(time) = subscription.effective_time() {
                    slice_time = Some(match slice_time {
                        Some(current) => current.min(time),
                        None => time,
                    });
                }
            }

            let slice_time = match slice_time {
                Some(time) => time,
                None if any_not_ready => return FeedPoll::Pending,
                None => return FeedPoll::Done,
            };
            if slice_time > self.end_utc {
                return FeedPoll::Done;
            }
            if let Some(previous) = self.previous_slice_time {
                debug_assert!(slice_time > previous, "slice times must strictly increase");
            }

            let mut builder = TimeSliceBuilder::new(slice_time);

            // Universe items consumed at this instant run selection before
            // slice membership is decided, so a subscription they add can
            // still contribute an item closing exactly at this instant and
            // the next slice is never forced back to this one's time.
            let mut universe_items: Vec<(SubscriptionId, BaseDataCollection)> = Vec::new();
            for id in self.ordered_ids.clone() {
                let Some(subscription) = self.subscriptions.get_mut(&id) else {
                    continue;
                };
                if subscription.removed || !subscription.is_universe {
                    continue;
                }
                while subscription.front_time() == Some(slice_time) {
                    let item = subscription.front.take().unwrap();
                    subscription.current_end_utc = slice_time;
                    if let BaseDataEnum::Collection(collection) = item {
                        universe_items.push((id, collection));
                    }
                    subscription.refill_front(self.data_failure_limit);
                }
            }
            let changes = self.run_universe_selection(universe_items, slice_time);

            for id in self.ordered_ids.clone() {
                let Some(subscription) = self.subscriptions.get_mut(&id) else {
                    continue;
                };
                if subscription.removed || subscription.is_universe {
                    continue;
                }
                if subscription.front.is_none() {
                    // Subscriptions created by this instant's selection have
                    // not buffered a front yet.
                    subscription.refill_front(self.data_failure_limit);
                }

                // Pop every front item tied at this instant, simultaneous
                // ticks land in the same slice in feed order.
                while subscription.front_time() == Some(slice_time) {
                    let item = subscription.front.take().unwrap();
                    subscription.current_end_utc = slice_time;
                    subscription.remember_bar(&item, slice_time);
                    if self.conversion_symbols.contains(item.symbol()) {
                        builder.add_cash_update(item.symbol().clone(), item.value());
                    }
                    builder.add(item, subscription.config.is_internal_feed);
                    subscription.refill_front(self.data_failure_limit);
                }

                // No real data at this instant: synthesize on the exchange
                // cadence when the subscription fills forward.
                if subscription.fill_forward_time() == Some(slice_time) {
                    if let Some(synthesized) = subscription.synthesize_fill_forward(slice_time) {
                        builder.add(synthesized, subscription.config.is_internal_feed);
                    }
                }
            }

            if !changes.is_empty() {
                builder.set_security_changes(changes);
            }

            if builder.is_empty() {
                // A universe item that selected nothing new, keep merging.
                continue;
            }

            self.previous_slice_time = Some(slice_time);
            return FeedPoll::Slice(builder.build());
        }
    }

    fn run_universe_selection(
        &mut self,
        universe_items: Vec<(SubscriptionId, BaseDataCollection)>,
        slice_time: DateTime<Utc>,
    ) -> SecurityChanges {
        let mut changes = SecurityChanges::none();
        for (id, collection) in universe_items {
            let (selection, universe_name) = match self.universes.get_mut(&id) {
                Some(universe) => (universe.select(&collection), universe.name.clone()),
                None => continue,
            };
            for symbol in &selection.added {
                match self.subscription_factory.as_mut().and_then(|f| f(symbol, slice_time)) {
                    Some((config, source, hours)) => {
                        self.insert_subscription(config, source, hours, slice_time, false);
                    }
                    None => warn!(
                        "Universe {}: no subscription factory result for {}",
                        universe_name, symbol
                    ),
                }
            }
            for symbol in selection.removed.clone() {
                self.remove_symbol_subscriptions(&symbol);
            }
            changes.merge(selection);
        }
        changes
    }

    fn prune(&mut self) {
        let dead: Vec<SubscriptionId> = self
            .subscriptions
            .values()
            .filter(|s| s.removed || (s.exhausted && s.front.is_none()))
            .map(|s| s.id)
            .collect();
        for id in dead {
            self.subscriptions.remove(&id);
            self.universes.remove(&id);
        }
        self.ordered_ids.retain(|id| self.subscriptions.contains_key(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::market_data::sources::VecDataSource;
    use crate::standardized_types::base_data::base_data_type::BaseDataType;
    use crate::standardized_types::base_data::custom::CustomData;
    use crate::standardized_types::base_data::tick::Tick;
    use crate::standardized_types::enums::SecurityType;
    use crate::standardized_types::market_hours::MarketHoursDatabase;
    use crate::standardized_types::resolution::Resolution;
    use crate::standardized_types::symbols::SecurityIdentifier;
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::New_York;
    use rust_decimal_macros::dec;

    fn symbol(ticker: &str) -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity(ticker, 1), ticker.to_string())
    }

    fn hours() -> Arc<MarketHours> {
        MarketHoursDatabase::new()
            .get("usa", SecurityType::Equity, None)
            .unwrap()
    }

    fn config(ticker: &str, resolution: Resolution, data_type: BaseDataType) -> SubscriptionDataConfig {
        SubscriptionDataConfig::new(
            symbol(ticker),
            resolution,
            data_type,
            "usa".to_string(),
            New_York,
            New_York,
        )
    }

    fn minute_bar(ticker: &str, open_local: (u32, u32), close: rust_decimal::Decimal) -> BaseDataEnum {
        let (hour, minute) = open_local;
        let time = New_York
            .with_ymd_and_hms(2024, 3, 4, hour, minute, 0)
            .unwrap()
            .to_utc();
        BaseDataEnum::TradeBar(TradeBar::new(
            symbol(ticker),
            close, close, close, close,
            dec!(1000),
            time,
            Resolution::Minute,
        ))
    }

    fn far_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn drain(feed: &mut DataFeed) -> Vec<TimeSlice> {
        let mut slices = Vec::new();
        loop {
            match feed.next_slice() {
                FeedPoll::Slice(slice) => slices.push(slice),
                FeedPoll::Done => break,
                FeedPoll::Pending => panic!("backtest feed reported pending"),
            }
        }
        slices
    }

    #[test]
    fn merges_two_subscriptions_in_time_order() {
        let mut feed = DataFeed::new(far_end(), 3);
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("AAPL", (9, 30), dec!(150)),
                minute_bar("AAPL", (9, 32), dec!(151)),
            ])),
            hours(),
            start(),
        );
        feed.add_subscription(
            config("MSFT", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("MSFT", (9, 31), dec!(400)),
                minute_bar("MSFT", (9, 32), dec!(401)),
            ])),
            hours(),
            start(),
        );

        let slices = drain(&mut feed);
        let times: Vec<DateTime<Utc>> = slices.iter().map(|s| s.utc_time).collect();
        // Strictly increasing.
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(slices.len(), 3);
        // The 09:33 slice carries both symbols.
        let last = &slices[2];
        assert_eq!(last.count(), 2);
        assert!(last.slice.trade_bars.contains_key(&symbol("AAPL")));
        assert!(last.slice.trade_bars.contains_key(&symbol("MSFT")));
    }

    #[test]
    fn no_data_loss_across_slices() {
        let mut feed = DataFeed::new(far_end(), 3);
        let bars: Vec<BaseDataEnum> = (0..10)
            .map(|i| minute_bar("AAPL", (9, 30 + i), dec!(150)))
            .collect();
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(bars)),
            hours(),
            start(),
        );
        let slices = drain(&mut feed);
        let total: usize = slices.iter().map(|s| s.count()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn simultaneous_ticks_share_one_slice_in_feed_order() {
        let time = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let ticks: Vec<BaseDataEnum> = [dec!(150.00), dec!(150.05), dec!(150.01)]
            .iter()
            .map(|price| BaseDataEnum::Tick(Tick::new(symbol("AAPL"), *price, dec!(1), time)))
            .collect();
        let mut feed = DataFeed::new(far_end(), 3);
        feed.add_subscription(
            config("AAPL", Resolution::Tick, BaseDataType::Ticks),
            Box::new(VecDataSource::new(ticks)),
            hours(),
            start(),
        );
        let slices = drain(&mut feed);
        assert_eq!(slices.len(), 1);
        let prices: Vec<_> = slices[0].slice.ticks[&symbol("AAPL")]
            .iter()
            .map(|t| t.price)
            .collect();
        assert_eq!(prices, vec![dec!(150.00), dec!(150.05), dec!(150.01)]);
    }

    #[test]
    fn fill_forward_synthesizes_on_exchange_cadence() {
        let mut feed = DataFeed::new(far_end(), 3);
        let mut cfg = config("AAPL", Resolution::Minute, BaseDataType::TradeBars);
        cfg.fill_forward = true;
        // Real bars at 09:30 and 09:33, the 09:32 and 09:33 closes are
        // synthesized from the 09:30 bar.
        feed.add_subscription(
            cfg,
            Box::new(VecDataSource::new(vec![
                minute_bar("AAPL", (9, 30), dec!(150)),
                minute_bar("AAPL", (9, 33), dec!(152)),
            ])),
            hours(),
            start(),
        );
        let slices = drain(&mut feed);
        let times: Vec<DateTime<Utc>> = slices.iter().map(|s| s.utc_time).collect();
        let expected: Vec<DateTime<Utc>> = [(9, 31), (9, 32), (9, 33), (9, 34)]
            .iter()
            .map(|(h, m)| New_York.with_ymd_and_hms(2024, 3, 4, *h, *m, 0).unwrap().to_utc())
            .collect();
        assert_eq!(times, expected);

        for ff_slice in &slices[1..3] {
            let ff_bar = &ff_slice.slice.trade_bars[&symbol("AAPL")];
            assert!(ff_bar.is_fill_forward);
            assert_eq!(ff_bar.close, dec!(150));
            assert_eq!(ff_bar.volume, dec!(0));
        }
        let real_bar = &slices[3].slice.trade_bars[&symbol("AAPL")];
        assert!(!real_bar.is_fill_forward);
        assert_eq!(real_bar.close, dec!(152));
    }

    #[test]
    fn out_of_order_items_are_dropped() {
        let mut feed = DataFeed::new(far_end(), 3);
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("AAPL", (9, 32), dec!(151)),
                minute_bar("AAPL", (9, 30), dec!(150)), // protocol violation
                minute_bar("AAPL", (9, 33), dec!(152)),
            ])),
            hours(),
            start(),
        );
        let slices = drain(&mut feed);
        assert_eq!(slices.len(), 2);
        let closes: Vec<_> = slices
            .iter()
            .map(|s| s.slice.trade_bars[&symbol("AAPL")].close)
            .collect();
        assert_eq!(closes, vec![dec!(151), dec!(152)]);
    }

    struct FailingSource {
        failures: u8,
    }

    impl DataSource for FailingSource {
        fn next(&mut self) -> Result<SourcePoll, EngineError> {
            self.failures += 1;
            Err(EngineError::Data("corrupt archive".to_string()))
        }
    }

    #[test]
    fn repeated_failures_deactivate_subscription() {
        let mut feed = DataFeed::new(far_end(), 3);
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(FailingSource { failures: 0 }),
            hours(),
            start(),
        );
        assert!(matches!(feed.next_slice(), FeedPoll::Done));
        assert_eq!(feed.active_count(), 0);
    }

    #[test]
    fn removed_subscription_never_reappears() {
        let mut feed = DataFeed::new(far_end(), 3);
        let aapl = feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("AAPL", (9, 30), dec!(150)),
                minute_bar("AAPL", (9, 31), dec!(151)),
            ])),
            hours(),
            start(),
        );
        feed.add_subscription(
            config("MSFT", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("MSFT", (9, 30), dec!(400)),
                minute_bar("MSFT", (9, 31), dec!(401)),
            ])),
            hours(),
            start(),
        );

        match feed.next_slice() {
            FeedPoll::Slice(slice) => assert_eq!(slice.count(), 2),
            _ => panic!("expected slice"),
        }
        feed.remove_subscription(aapl);
        match feed.next_slice() {
            FeedPoll::Slice(slice) => {
                assert_eq!(slice.count(), 1);
                assert!(slice.slice.trade_bars.contains_key(&symbol("MSFT")));
            }
            _ => panic!("expected slice"),
        }
    }

    #[test]
    fn end_date_clamps_the_stream() {
        let end = New_York.with_ymd_and_hms(2024, 3, 4, 9, 32, 0).unwrap().to_utc();
        let mut feed = DataFeed::new(end, 3);
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("AAPL", (9, 30), dec!(150)),
                minute_bar("AAPL", (9, 35), dec!(152)),
            ])),
            hours(),
            start(),
        );
        let slices = drain(&mut feed);
        assert_eq!(slices.len(), 1);
        assert!(slices[0].utc_time <= end);
    }

    fn universe_collection(at: DateTime<Utc>, tickers: &[&str]) -> BaseDataEnum {
        BaseDataEnum::Collection(BaseDataCollection {
            symbol: symbol("COARSE"),
            time: at,
            end_time: at,
            items: tickers
                .iter()
                .map(|t| {
                    BaseDataEnum::Custom(CustomData {
                        symbol: symbol(t),
                        type_name: "universe".to_string(),
                        time: at,
                        end_time: at,
                        value: dec!(100),
                        payload: String::new(),
                    })
                })
                .collect(),
        })
    }

    #[test]
    fn universe_add_creates_subscription_for_next_slice() {
        let t5 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 35, 0).unwrap().to_utc();
        let mut feed = DataFeed::new(far_end(), 3);

        // The factory serves TSLA bars positioned at or after the selection
        // instant, the way the engine's file sources are rooted.
        feed.set_subscription_factory(Box::new(|sym: &Symbol, at: DateTime<Utc>| {
            assert_eq!(sym.ticker, "TSLA");
            let bars = vec![
                minute_bar("TSLA", (9, 35), dec!(180)),
                minute_bar("TSLA", (9, 36), dec!(181)),
            ];
            Some((
                config("TSLA", Resolution::Minute, BaseDataType::TradeBars),
                Box::new(VecDataSource::new(
                    bars.into_iter().filter(|b| b.end_time() >= at).collect(),
                )) as Box<dyn DataSource>,
                MarketHoursDatabase::new()
                    .get("usa", SecurityType::Equity, None)
                    .unwrap(),
            ))
        }));

        let mut universe_cfg = config("COARSE", Resolution::Minute, BaseDataType::Collections);
        universe_cfg.is_internal_feed = true;
        feed.add_universe(
            "test-universe",
            universe_cfg,
            Box::new(VecDataSource::new(vec![universe_collection(t5, &["TSLA"])])),
            hours(),
            start(),
            Box::new(|data: &BaseDataCollection| {
                data.items.iter().map(|i| i.symbol().clone()).collect()
            }),
        );
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![
                minute_bar("AAPL", (9, 34), dec!(150)),
                minute_bar("AAPL", (9, 35), dec!(151)),
                minute_bar("AAPL", (9, 36), dec!(152)),
            ])),
            hours(),
            start(),
        );

        let slices = drain(&mut feed);
        // Selection runs against the universe item consumed at 09:35, the
        // changes ride on that slice and TSLA data begins strictly after it.
        let with_changes: Vec<&TimeSlice> = slices
            .iter()
            .filter(|s| !s.security_changes.is_empty())
            .collect();
        assert_eq!(with_changes.len(), 1);
        assert_eq!(with_changes[0].security_changes.added, vec![symbol("TSLA")]);

        let tsla_slices: Vec<&TimeSlice> = slices
            .iter()
            .filter(|s| s.slice.trade_bars.contains_key(&symbol("TSLA")))
            .collect();
        assert_eq!(tsla_slices.len(), 2);
        // TSLA data only appears at or after the selection instant.
        assert!(tsla_slices.iter().all(|s| s.utc_time > t5));
    }

    #[test]
    fn universe_added_subscription_contributes_at_the_selection_instant() {
        // The added symbol's first bar closes exactly when selection runs.
        // It must land in the selection slice itself, never in a later slice
        // carrying the same time, and slice times must stay strictly
        // increasing.
        let t5 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 35, 0).unwrap().to_utc();
        let mut feed = DataFeed::new(far_end(), 3);

        feed.set_subscription_factory(Box::new(|sym: &Symbol, _at: DateTime<Utc>| {
            assert_eq!(sym.ticker, "TSLA");
            Some((
                config("TSLA", Resolution::Minute, BaseDataType::TradeBars),
                Box::new(VecDataSource::new(vec![
                    // Opens 09:34, closes 09:35: exactly the selection instant.
                    minute_bar("TSLA", (9, 34), dec!(179)),
                    minute_bar("TSLA", (9, 35), dec!(180)),
                ])) as Box<dyn DataSource>,
                MarketHoursDatabase::new()
                    .get("usa", SecurityType::Equity, None)
                    .unwrap(),
            ))
        }));

        let mut universe_cfg = config("COARSE", Resolution::Minute, BaseDataType::Collections);
        universe_cfg.is_internal_feed = true;
        feed.add_universe(
            "test-universe",
            universe_cfg,
            Box::new(VecDataSource::new(vec![universe_collection(t5, &["TSLA"])])),
            hours(),
            start(),
            Box::new(|data: &BaseDataCollection| {
                data.items.iter().map(|i| i.symbol().clone()).collect()
            }),
        );

        let slices = drain(&mut feed);
        let times: Vec<DateTime<Utc>> = slices.iter().map(|s| s.utc_time).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(slices[0].utc_time, t5);
        assert_eq!(slices[0].security_changes.added, vec![symbol("TSLA")]);
        let first_bar = &slices[0].slice.trade_bars[&symbol("TSLA")];
        assert_eq!(first_bar.close, dec!(179));
        assert_eq!(slices[1].utc_time, t5 + Duration::minutes(1));
        assert_eq!(slices[1].slice.trade_bars[&symbol("TSLA")].close, dec!(180));
    }

    #[test]
    fn universe_removal_drops_subscription() {
        let t1 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 35, 0).unwrap().to_utc();
        let t2 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 40, 0).unwrap().to_utc();
        let mut feed = DataFeed::new(far_end(), 3);

        feed.set_subscription_factory(Box::new(|sym: &Symbol, _at| {
            let ticker = sym.ticker.clone();
            let bars: Vec<BaseDataEnum> = (36..45)
                .map(|m| minute_bar(&ticker, (9, m), dec!(100)))
                .collect();
            Some((
                config(&ticker, Resolution::Minute, BaseDataType::TradeBars),
                Box::new(VecDataSource::new(bars)) as Box<dyn DataSource>,
                MarketHoursDatabase::new()
                    .get("usa", SecurityType::Equity, None)
                    .unwrap(),
            ))
        }));

        let mut universe_cfg = config("COARSE", Resolution::Minute, BaseDataType::Collections);
        universe_cfg.is_internal_feed = true;
        feed.add_universe(
            "test-universe",
            universe_cfg,
            Box::new(VecDataSource::new(vec![
                universe_collection(t1, &["TSLA"]),
                universe_collection(t2, &[]),
            ])),
            hours(),
            start(),
            Box::new(|data: &BaseDataCollection| {
                data.items.iter().map(|i| i.symbol().clone()).collect()
            }),
        );

        let slices = drain(&mut feed);
        let removed: Vec<&TimeSlice> = slices
            .iter()
            .filter(|s| !s.security_changes.removed.is_empty())
            .collect();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].security_changes.removed, vec![symbol("TSLA")]);
        // No TSLA data after the removal slice.
        assert!(slices
            .iter()
            .filter(|s| s.utc_time > removed[0].utc_time)
            .all(|s| !s.slice.trade_bars.contains_key(&symbol("TSLA"))));
    }

    #[test]
    fn cash_updates_for_conversion_symbols() {
        let mut feed = DataFeed::new(far_end(), 3);
        feed.register_conversion_symbol(symbol("EURUSD"));
        let mut cfg = config("EURUSD", Resolution::Minute, BaseDataType::TradeBars);
        cfg.is_internal_feed = true;
        feed.add_subscription(
            cfg,
            Box::new(VecDataSource::new(vec![minute_bar("EURUSD", (9, 30), dec!(1.05))])),
            hours(),
            start(),
        );
        feed.add_subscription(
            config("AAPL", Resolution::Minute, BaseDataType::TradeBars),
            Box::new(VecDataSource::new(vec![minute_bar("AAPL", (9, 30), dec!(150))])),
            hours(),
            start(),
        );
        let slices = drain(&mut feed);
        assert_eq!(slices.len(), 1);
        assert_eq!(
            slices[0].cash_updates,
            vec![(symbol("EURUSD"), dec!(1.05))]
        );
        // Internal feed stays out of the algorithm slice.
        assert!(!slices[0].slice.trade_bars.contains_key(&symbol("EURUSD")));
    }
}
