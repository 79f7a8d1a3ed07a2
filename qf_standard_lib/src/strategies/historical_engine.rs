use crate::app::settings::EngineSettings;
use crate::errors::{EngineError, EngineExitCode};
use crate::market_data::sources::{DataSource, FileDataSource};
use crate::standardized_types::base_data::base_data_type::BaseDataType;
use crate::standardized_types::base_data::custom::CustomDecoderRegistry;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::enums::{AlgorithmStatus, SecurityType, StrategyMode};
use crate::standardized_types::market_hours::{MarketHours, MarketHoursDatabase};
use crate::standardized_types::orders::{OrderEvent, SubmitOrderRequest};
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::securities::{Security, SecurityMap, SymbolProperties};
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use crate::standardized_types::symbols::{MarketRegistry, SecurityIdentifier, Symbol, SymbolCache};
use crate::standardized_types::time_slices::TimeSlice;
use crate::strategies::algorithm::{Algorithm, StrategyApi, SubscriptionRequest};
use crate::strategies::handlers::data_feed::{DataFeed, FeedPoll};
use crate::strategies::handlers::market_handler::backtest_matching_engine::SimulatedBrokerage;
use crate::strategies::handlers::market_handler::brokerage_models::{
    BrokerageModel, DefaultBrokerageModel,
};
use crate::strategies::handlers::market_handler::fill_models::ImmediateFillModel;
use crate::strategies::handlers::market_handler::transaction_handler::TransactionHandler;
use crate::strategies::handlers::results_handler::{
    BacktestResult, ResultSink, ResultsHandler,
};
use crate::strategies::handlers::subscription_handler::SubscriptionHandler;
use crate::strategies::handlers::timed_events_handler::TimedEventHandler;
use crate::strategies::ledgers::Ledger;
use crate::strategies::universe::UniverseSelector;
use crate::time::clock::EngineClock;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{error, info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

/// Process-lifetime registries, owned by the engine and passed by reference.
/// Replaces ambient global state: construction is explicit at engine start,
/// `reset` clears everything the next run must not inherit.
pub struct EngineContext {
    pub market_registry: MarketRegistry,
    pub symbol_cache: SymbolCache,
    pub market_hours: MarketHoursDatabase,
    pub decoders: CustomDecoderRegistry,
}

impl EngineContext {
    pub fn new() -> Self {
        EngineContext {
            market_registry: MarketRegistry::new(),
            symbol_cache: SymbolCache::new(),
            market_hours: MarketHoursDatabase::new(),
            decoders: CustomDecoderRegistry::new(),
        }
    }

    pub fn reset(&self) {
        self.symbol_cache.clear();
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Defaults applied to subscriptions created by universe selection.
#[derive(Clone, Debug)]
pub struct UniverseSettings {
    pub resolution: Resolution,
    pub fill_forward: bool,
    pub extended_hours: bool,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        UniverseSettings {
            resolution: Resolution::Minute,
            fill_forward: false,
            extended_hours: false,
        }
    }
}

/// The engine loop: owns the simulated clock and drives every synchronized
/// component once per time slice, in the fixed order the pipeline defines.
pub struct HistoricalEngine {
    algorithm_id: String,
    mode: StrategyMode,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
    settings: EngineSettings,
    context: Arc<EngineContext>,
    clock: Arc<EngineClock>,
    feed: DataFeed,
    scheduler: TimedEventHandler,
    brokerage: Arc<SimulatedBrokerage>,
    transactions: Arc<TransactionHandler>,
    securities: SecurityMap,
    ledger: Ledger,
    subscription_handler: Arc<std::sync::RwLock<SubscriptionHandler>>,
    results: ResultsHandler,
    results_task: tokio::task::JoinHandle<()>,
    universe_settings: Arc<std::sync::RwLock<UniverseSettings>>,
    stop: Arc<AtomicBool>,
    next_end_of_day: AHashMap<Symbol, DateTime<Utc>>,
    slice_count: u64,
    data_point_count: u64,
}

impl HistoricalEngine {
    pub fn new(
        algorithm_id: &str,
        mode: StrategyMode,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        starting_cash: Decimal,
        settings: EngineSettings,
        sink: Box<dyn ResultSink>,
    ) -> Self {
        let context = Arc::new(EngineContext::new());
        let brokerage_model: Arc<dyn BrokerageModel> = Arc::new(DefaultBrokerageModel::default());
        let brokerage = Arc::new(SimulatedBrokerage::new(
            Box::new(ImmediateFillModel),
            brokerage_model,
        ));
        let transactions = Arc::new(TransactionHandler::new(brokerage.clone()));
        let (results, results_task) = ResultsHandler::spawn(sink, settings.notification_rate_limit);
        let mut feed = DataFeed::new(end_utc, settings.data_failure_limit);

        // Universe additions become file-backed subscriptions rooted at the
        // selection instant.
        let factory_context = context.clone();
        let factory_data_dir = settings.data_directory.clone();
        let factory_end = end_utc;
        let universe_settings = Arc::new(std::sync::RwLock::new(UniverseSettings::default()));
        let factory_universe_settings = universe_settings.clone();
        feed.set_subscription_factory(Box::new(move |symbol: &Symbol, at: DateTime<Utc>| {
            let market = factory_context
                .market_registry
                .name(symbol.sid.market_code())?;
            let hours = factory_context.market_hours.get(
                &market,
                symbol.security_type(),
                Some(&symbol.ticker),
            )?;
            let universe_settings = factory_universe_settings.read().unwrap().clone();
            let mut config = SubscriptionDataConfig::new(
                symbol.clone(),
                universe_settings.resolution,
                BaseDataType::TradeBars,
                market,
                hours.data_time_zone,
                hours.exchange_time_zone,
            );
            config.fill_forward = universe_settings.fill_forward;
            config.extended_hours = universe_settings.extended_hours;
            let code = symbol.sid.market_code();
            let source = FileDataSource::new(
                factory_data_dir.clone(),
                config.clone(),
                at,
                factory_end,
                hours.clone(),
                code,
                None,
            );
            Some((config, Box::new(source) as Box<dyn DataSource>, hours))
        }));

        let algorithm_id = if algorithm_id.is_empty() {
            format!("algorithm-{}", uuid::Uuid::new_v4())
        } else {
            algorithm_id.to_string()
        };
        let history_to_retain = settings.max_history_minutes as usize;
        HistoricalEngine {
            algorithm_id,
            mode,
            start_utc,
            end_utc,
            settings,
            context,
            clock: Arc::new(EngineClock::new(start_utc)),
            feed,
            scheduler: TimedEventHandler::new(start_utc, end_utc),
            brokerage,
            transactions,
            securities: Arc::new(DashMap::new()),
            ledger: Ledger::new("USD", starting_cash),
            subscription_handler: Arc::new(std::sync::RwLock::new(
                SubscriptionHandler::new().with_history(history_to_retain),
            )),
            results,
            results_task,
            universe_settings,
            stop: Arc::new(AtomicBool::new(false)),
            next_end_of_day: AHashMap::new(),
            slice_count: 0,
            data_point_count: 0,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn clock(&self) -> &Arc<EngineClock> {
        &self.clock
    }

    /// Cooperative cancellation: checked at every loop iteration.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn set_universe_settings(&mut self, settings: UniverseSettings) {
        *self.universe_settings.write().unwrap() = settings;
    }

    /// Wires a pre-built subscription straight into the feed, used by
    /// embedders and tests that bypass the data directory.
    pub fn add_manual_subscription(
        &mut self,
        config: SubscriptionDataConfig,
        source: Box<dyn DataSource>,
        market_hours: Arc<MarketHours>,
    ) {
        self.ensure_security(&config.symbol, market_hours.clone());
        let id = self
            .feed
            .add_subscription(config.clone(), source, market_hours, self.start_utc);
        if let Some(mut security) = self.securities.get_mut(&config.symbol) {
            security.subscriptions.push(id);
        }
    }

    /// Registers a universe: a coarse subscription plus its selector.
    pub fn add_universe(
        &mut self,
        name: &str,
        config: SubscriptionDataConfig,
        source: Box<dyn DataSource>,
        market_hours: Arc<MarketHours>,
        selector: UniverseSelector,
    ) {
        self.feed
            .add_universe(name, config, source, market_hours, self.start_utc, selector);
    }

    /// Registers a non-base currency whose rate follows a conversion
    /// security's closes delivered on an internal feed.
    pub fn add_currency(
        &mut self,
        currency: &str,
        amount: Decimal,
        conversion_rate: Decimal,
        conversion_symbol: Symbol,
    ) {
        self.feed
            .register_conversion_symbol(conversion_symbol.clone());
        self.ledger.cash_book_mut().add_currency(
            currency,
            amount,
            conversion_rate,
            Some(conversion_symbol),
        );
    }

    /// Runs the algorithm to completion. The returned exit code is what the
    /// launcher hands to the OS.
    pub async fn run(mut self, algorithm: &mut dyn Algorithm) -> EngineExitCode {
        self.results
            .algorithm_status(&self.algorithm_id, AlgorithmStatus::Initializing, None);
        self.context.reset();

        let mut api = StrategyApi::new(
            self.clock.clone(),
            self.transactions.clone(),
            self.results.clone(),
            self.subscription_handler.clone(),
            self.ledger.snapshot(),
        );

        let setup_started = Instant::now();
        if let Err(e) = algorithm.initialize(&mut api) {
            let exit = self.abort_deploy(&e.to_string());
            self.flush_results(api, exit).await;
            return exit;
        }
        if setup_started.elapsed() > StdDuration::from_secs(self.settings.setup_timeout_seconds) {
            let exit = self.abort_deploy("Initialization exceeded the setup timeout");
            self.flush_results(api, exit).await;
            return exit;
        }
        if let Err(e) = self.apply_api_side_effects(&mut api) {
            let exit = self.abort_deploy(&e.to_string());
            self.flush_results(api, exit).await;
            return exit;
        }

        self.results
            .algorithm_status(&self.algorithm_id, AlgorithmStatus::Running, None);
        info!(
            "Engine: {} running {} from {} to {}",
            self.algorithm_id, self.mode, self.start_utc, self.end_utc
        );

        let run_started = Instant::now();
        let max_runtime = StdDuration::from_secs(self.settings.max_runtime_hours * 3600);
        let callback_timeout = StdDuration::from_secs(match self.mode {
            StrategyMode::Backtest => self.settings.backtest_callback_timeout_seconds,
            _ => self.settings.live_callback_timeout_seconds,
        });

        let exit = loop {
            if self.stop.load(Ordering::Acquire) {
                self.results.algorithm_status(
                    &self.algorithm_id,
                    AlgorithmStatus::Stopped,
                    Some("Stopped by command".to_string()),
                );
                break EngineExitCode::Aborted;
            }
            if run_started.elapsed() > max_runtime {
                self.results.algorithm_status(
                    &self.algorithm_id,
                    AlgorithmStatus::Stopped,
                    Some("Maximum runtime reached".to_string()),
                );
                break EngineExitCode::Aborted;
            }

            let slice = match self.feed.next_slice() {
                FeedPoll::Slice(slice) => slice,
                FeedPoll::Pending => {
                    // Live feeds: nothing buffered yet.
                    tokio::time::sleep(StdDuration::from_millis(1)).await;
                    continue;
                }
                FeedPoll::Done => {
                    self.results.algorithm_status(
                        &self.algorithm_id,
                        AlgorithmStatus::Completed,
                        None,
                    );
                    break EngineExitCode::Ok;
                }
            };

            let step_started = Instant::now();
            match self.process_slice(slice, algorithm, &mut api) {
                Ok(()) => {}
                Err(e) => {
                    break self.abort_runtime(&e.to_string());
                }
            }
            if step_started.elapsed() > callback_timeout {
                break self.abort_runtime("Slice processing exceeded the callback timeout");
            }

            if let Some(reason) = api.stop_requested.take() {
                self.results.algorithm_status(
                    &self.algorithm_id,
                    AlgorithmStatus::Stopped,
                    Some(reason),
                );
                break EngineExitCode::Aborted;
            }
        };

        self.flush_results(api, exit).await;
        exit
    }

    fn process_slice(
        &mut self,
        mut slice: TimeSlice,
        algorithm: &mut dyn Algorithm,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        let utc_time = slice.utc_time;
        self.slice_count += 1;
        self.data_point_count += slice.count() as u64;

        // 2. Advance the synchronized clock.
        self.clock.set_time(utc_time);

        // 3. Securities enter and leave with the universe.
        let changes = slice.security_changes.clone();
        for symbol in &changes.added {
            let market = self
                .context
                .market_registry
                .name(symbol.sid.market_code())
                .unwrap_or_else(|| "usa".to_string());
            if let Some(hours) =
                self.context
                    .market_hours
                    .get(&market, symbol.security_type(), Some(&symbol.ticker))
            {
                self.ensure_security(symbol, hours);
            }
        }
        for symbol in &changes.removed {
            self.securities.remove(symbol);
            self.subscription_handler.write().unwrap().remove_symbol(symbol);
            self.next_end_of_day.remove(symbol);
        }

        // 4. Prices, conversion rates and consolidators.
        for (symbol, price) in &slice.security_updates {
            if let Some(mut security) = self.securities.get_mut(symbol) {
                security.last_price = *price;
            }
            self.ledger.update_market_price(symbol, *price);
        }
        for item in slice.iter() {
            if let Some(mut security) = self.securities.get_mut(item.symbol()) {
                security.update(item);
            }
        }
        for (symbol, price) in &slice.cash_updates {
            self.ledger
                .cash_book_mut()
                .update_conversion_rate(symbol, *price);
        }
        {
            let mut handler = self.subscription_handler.write().unwrap();
            let mut consolidated = handler.update_time_slice(&slice);
            consolidated.extend(handler.update_consolidators_time(utc_time));
            slice.consolidator_updates = consolidated;
        }

        // 5. Scheduled events fire before the data handler.
        for (fire_time, name) in self.scheduler.drain_due(utc_time) {
            api.ledger_snapshot = self.ledger.snapshot();
            match algorithm.on_scheduled_event(&name, fire_time, api) {
                Ok(()) => self.scheduler.record_success(&name),
                Err(e) => {
                    error!("Scheduled event {}: {}", name, e);
                    self.results.handled_error(&e.to_string(), "");
                    let failures = self.scheduler.record_failure(&name);
                    if failures >= self.settings.scheduler_failure_limit {
                        return Err(EngineError::Runtime(format!(
                            "Scheduled event {} failed {} consecutive times",
                            name, failures
                        )));
                    }
                }
            }
        }

        // Calendar rollover: end-of-day callbacks after scheduled events and
        // before the next slice's data handler.
        let eod_symbols: Vec<Symbol> = self
            .next_end_of_day
            .iter()
            .filter(|(_, close)| utc_time >= **close)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        for symbol in eod_symbols {
            api.ledger_snapshot = self.ledger.snapshot();
            algorithm
                .on_end_of_day(&symbol, api)
                .map_err(|e| EngineError::Runtime(e.to_string()))?;
            if let Some(security) = self.securities.get(&symbol) {
                if let Some(next) = security.market_hours.next_market_close(utc_time) {
                    self.next_end_of_day.insert(symbol, next);
                }
            }
        }

        // 6. Pump queued order requests, then the brokerage scan.
        let mut order_events =
            self.transactions
                .process_requests(utc_time, &self.securities, &mut self.ledger);
        order_events.extend(
            self.transactions
                .scan_and_settle(utc_time, &self.securities, &mut self.ledger),
        );
        self.deliver_order_events(&order_events, algorithm, api)?;

        // 7. The algorithm sees the slice, then any security changes.
        api.ledger_snapshot = self.ledger.snapshot();
        algorithm
            .on_data(&slice, api)
            .map_err(|e| EngineError::Runtime(e.to_string()))?;
        if !changes.is_empty() {
            algorithm
                .on_securities_changed(&changes, api)
                .map_err(|e| EngineError::Runtime(e.to_string()))?;
        }
        self.apply_api_side_effects(api)?;

        // Requests submitted inside callbacks reach the brokerage within the
        // same slice so their acknowledgments carry this slice's time.
        let callback_events =
            self.transactions
                .process_requests(utc_time, &self.securities, &mut self.ledger);
        self.deliver_order_events(&callback_events, algorithm, api)?;

        // 8. Margin check: liquidate when the portfolio no longer covers the
        // margin in use, after giving the algorithm its hook.
        let brokerage = self.brokerage.clone();
        let securities = self.securities.clone();
        let remaining = self.ledger.margin_remaining(|symbol| {
            securities
                .get(symbol)
                .map(|s| brokerage.brokerage_model().leverage(&s))
                .unwrap_or(dec!(1))
        });
        if remaining < dec!(0) {
            let mut requests: Vec<SubmitOrderRequest> = self
                .ledger
                .holdings()
                .filter(|h| !h.is_flat())
                .map(|h| {
                    let mut request =
                        SubmitOrderRequest::market(h.symbol.clone(), -h.quantity, utc_time);
                    request.tag = "Margin call liquidation".to_string();
                    request
                })
                .collect();
            warn!(
                "Engine: margin call at {}, {} liquidation orders",
                utc_time,
                requests.len()
            );
            api.ledger_snapshot = self.ledger.snapshot();
            algorithm
                .on_margin_call(&mut requests, api)
                .map_err(|e| EngineError::Runtime(e.to_string()))?;
            for request in requests {
                self.transactions.submit_order(request);
            }
            let margin_events =
                self.transactions
                    .process_requests(utc_time, &self.securities, &mut self.ledger);
            self.deliver_order_events(&margin_events, algorithm, api)?;
        }

        // 9. Push the per-slice delta to the result channel.
        api.charts.plot(
            "Strategy Equity",
            "Equity",
            utc_time.timestamp(),
            self.ledger.total_portfolio_value(),
        );
        Ok(())
    }

    fn deliver_order_events(
        &mut self,
        events: &[OrderEvent],
        algorithm: &mut dyn Algorithm,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        for event in events {
            self.results.order_event(event);
            api.ledger_snapshot = self.ledger.snapshot();
            algorithm
                .on_order_event(event, api)
                .map_err(|e| EngineError::Runtime(e.to_string()))?;
        }
        Ok(())
    }

    /// Applies side effects queued on the API: new subscriptions, schedule
    /// changes and nothing else. Runs after `initialize` and after each
    /// slice's callbacks.
    fn apply_api_side_effects(&mut self, api: &mut StrategyApi) -> Result<(), EngineError> {
        for request in std::mem::take(&mut api.subscription_requests) {
            self.add_file_subscription(request)?;
        }
        for event in std::mem::take(&mut api.scheduled_additions) {
            let context = self.context.clone();
            self.scheduler.schedule(event, &move |symbol: &Symbol| {
                let market = context.market_registry.name(symbol.sid.market_code())?;
                context
                    .market_hours
                    .get(&market, symbol.security_type(), Some(&symbol.ticker))
            });
        }
        for name in std::mem::take(&mut api.scheduled_cancellations) {
            self.scheduler.cancel(&name);
        }
        Ok(())
    }

    fn add_file_subscription(&mut self, request: SubscriptionRequest) -> Result<(), EngineError> {
        let market_code = self
            .context
            .market_registry
            .register(&request.market)
            .map_err(EngineError::Initialization)?;
        let ticker = crate::helpers::converters::formatted_ticker_name(&request.ticker);
        let sid = match request.security_type {
            SecurityType::Equity => SecurityIdentifier::generate_equity(&ticker, market_code),
            SecurityType::Forex => SecurityIdentifier::generate_forex(&ticker, market_code),
            SecurityType::Future => SecurityIdentifier::generate_future(&ticker, market_code),
            SecurityType::Crypto => SecurityIdentifier::generate_crypto(&ticker, market_code),
            SecurityType::Option | SecurityType::Custom => {
                SecurityIdentifier::generate_custom(&ticker, market_code)
            }
        };
        let hours = self
            .context
            .market_hours
            .get(&request.market, request.security_type, Some(&ticker))
            .ok_or_else(|| {
                EngineError::Initialization(format!(
                    "No market hours for {} {} {}",
                    request.market, request.security_type, ticker
                ))
            })?;

        // Equities resolve their trading ticker through the map file when one
        // exists, identity mapping otherwise.
        let mut trading_ticker = ticker.clone();
        if request.security_type == SecurityType::Equity {
            let map_path = crate::market_data::file_paths::map_file_path(
                &self.settings.data_directory,
                &request.market,
                &ticker,
            );
            match crate::market_data::map_files::MapFile::load(&map_path, &ticker) {
                Ok(Some(map_file)) => {
                    let start_date = self
                        .start_utc
                        .with_timezone(&hours.data_time_zone)
                        .date_naive();
                    trading_ticker = map_file.resolve(start_date).to_string();
                }
                Ok(None) => {}
                Err(e) => warn!("{}: unreadable map file, using identity mapping: {}", ticker, e),
            }
        }
        let symbol = Symbol::new(sid, trading_ticker);

        let mut config = SubscriptionDataConfig::new(
            symbol.clone(),
            request.resolution,
            request.data_type,
            request.market.to_lowercase(),
            hours.data_time_zone,
            hours.exchange_time_zone,
        );
        config.fill_forward = request.fill_forward;
        config.extended_hours = request.extended_hours;
        config.is_custom_data = request.data_type == BaseDataType::Custom;

        let decoder = if config.is_custom_data {
            self.context.decoders.get(&request.ticker)
        } else {
            None
        };
        let source = FileDataSource::new(
            self.settings.data_directory.clone(),
            config.clone(),
            self.start_utc,
            self.end_utc,
            hours.clone(),
            market_code,
            decoder,
        );
        self.ensure_security(&symbol, hours.clone());
        let id = self
            .feed
            .add_subscription(config, Box::new(source), hours, self.start_utc);
        if let Some(mut security) = self.securities.get_mut(&symbol) {
            security.subscriptions.push(id);
        }
        Ok(())
    }

    fn ensure_security(&mut self, symbol: &Symbol, hours: Arc<MarketHours>) {
        if !self.securities.contains_key(symbol) {
            self.securities.insert(
                symbol.clone(),
                Security::new(symbol.clone(), hours.clone(), SymbolProperties::default_equity()),
            );
            self.context.symbol_cache.insert(symbol.clone());
            if let Some(close) = hours.next_market_close(self.clock.time_utc()) {
                self.next_end_of_day.insert(symbol.clone(), close);
            }
        }
    }

    fn abort_deploy(&self, message: &str) -> EngineExitCode {
        error!("Engine: deploy error: {}", message);
        self.results.algorithm_status(
            &self.algorithm_id,
            AlgorithmStatus::DeployError,
            Some(message.to_string()),
        );
        self.results.handled_error(message, "");
        EngineExitCode::InitializationError
    }

    fn abort_runtime(&self, message: &str) -> EngineExitCode {
        error!("Engine: runtime error: {}", message);
        self.results.algorithm_status(
            &self.algorithm_id,
            AlgorithmStatus::RuntimeError,
            Some(message.to_string()),
        );
        self.results.handled_error(message, "");
        EngineExitCode::RuntimeError
    }

    async fn flush_results(self, mut api: StrategyApi, exit: EngineExitCode) {
        let mut statistics = BTreeMap::new();
        statistics.insert(
            "Net Profit".to_string(),
            self.ledger.realized_pnl().to_string(),
        );
        statistics.insert("Total Fees".to_string(), self.ledger.total_fees().to_string());
        statistics.insert(
            "End Portfolio Value".to_string(),
            self.ledger.total_portfolio_value().to_string(),
        );
        let mut runtime_statistics = BTreeMap::new();
        runtime_statistics.insert("Slices".to_string(), self.slice_count.to_string());
        runtime_statistics.insert("Data Points".to_string(), self.data_point_count.to_string());
        runtime_statistics.insert(
            "Orders".to_string(),
            self.transactions.all_orders().len().to_string(),
        );
        runtime_statistics.insert("Exit Code".to_string(), exit.code().to_string());

        let charts = std::mem::take(&mut api.charts);
        self.results.backtest_result(BacktestResult {
            charts: charts.into_charts(),
            orders: self.transactions.all_orders(),
            profit_loss: self.ledger.realized_pnl(),
            total_portfolio_value: self.ledger.total_portfolio_value(),
            statistics,
            runtime_statistics,
        });

        // Dropping the last sender lets the drainer flush and finish.
        drop(self.results);
        drop(api);
        if let Err(e) = self.results_task.await {
            warn!("Engine: result drainer ended abnormally: {}", e);
        }
    }
}
