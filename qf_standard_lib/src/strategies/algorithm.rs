use crate::errors::EngineError;
use crate::standardized_types::base_data::base_data_type::BaseDataType;
use crate::standardized_types::enums::SecurityType;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::orders::{
    Order, OrderEvent, OrderId, OrderTicket, SubmitOrderRequest, UpdateOrderRequest,
};
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::securities::SecurityChanges;
use crate::standardized_types::symbols::Symbol;
use crate::standardized_types::time_slices::TimeSlice;
use crate::standardized_types::base_data::quote_bar::QuoteBar;
use crate::standardized_types::base_data::tick::Tick;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::rolling_window::RollingWindow;
use crate::strategies::consolidators::ConsolidatorEnum;
use crate::strategies::handlers::market_handler::live_brokerage::BrokerMessage;
use crate::strategies::handlers::market_handler::transaction_handler::TransactionHandler;
use crate::strategies::handlers::results_handler::{ChartCollector, ResultsHandler};
use crate::strategies::handlers::subscription_handler::SubscriptionHandler;
use crate::strategies::handlers::timed_events_handler::TimedEvent;
use crate::strategies::ledgers::LedgerSnapshot;
use crate::time::clock::EngineClock;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};

/// What an algorithm asks the engine to subscribe during `initialize` or
/// later. The engine resolves it into a config, a data source and market
/// hours.
#[derive(Clone, Debug)]
pub struct SubscriptionRequest {
    pub ticker: String,
    pub security_type: SecurityType,
    pub market: String,
    pub resolution: Resolution,
    pub data_type: BaseDataType,
    pub fill_forward: bool,
    pub extended_hours: bool,
}

impl SubscriptionRequest {
    pub fn equity(ticker: &str, resolution: Resolution) -> Self {
        SubscriptionRequest {
            ticker: ticker.to_string(),
            security_type: SecurityType::Equity,
            market: "usa".to_string(),
            resolution,
            data_type: BaseDataType::TradeBars,
            fill_forward: false,
            extended_hours: false,
        }
    }

    pub fn with_fill_forward(mut self) -> Self {
        self.fill_forward = true;
        self
    }
}

/// The algorithm's window into the engine. Handed mutably into every
/// callback, all side effects (orders, plots, schedule changes, new
/// subscriptions) queue through it and are applied by the engine on its own
/// thread.
pub struct StrategyApi {
    clock: Arc<EngineClock>,
    transactions: Arc<TransactionHandler>,
    results: ResultsHandler,
    history: Arc<RwLock<SubscriptionHandler>>,
    pub(crate) ledger_snapshot: LedgerSnapshot,
    pub(crate) charts: ChartCollector,
    pub(crate) subscription_requests: Vec<SubscriptionRequest>,
    pub(crate) scheduled_additions: Vec<TimedEvent>,
    pub(crate) scheduled_cancellations: Vec<String>,
    pub(crate) stop_requested: Option<String>,
}

impl StrategyApi {
    pub(crate) fn new(
        clock: Arc<EngineClock>,
        transactions: Arc<TransactionHandler>,
        results: ResultsHandler,
        history: Arc<RwLock<SubscriptionHandler>>,
        ledger_snapshot: LedgerSnapshot,
    ) -> Self {
        StrategyApi {
            clock,
            transactions,
            results,
            history,
            ledger_snapshot,
            charts: ChartCollector::new(),
            subscription_requests: Vec::new(),
            scheduled_additions: Vec::new(),
            scheduled_cancellations: Vec::new(),
            stop_requested: None,
        }
    }

    pub fn time_utc(&self) -> DateTime<Utc> {
        self.clock.time_utc()
    }

    pub fn time_in(&self, time_zone: &Tz) -> DateTime<Tz> {
        self.clock.time_in(time_zone)
    }

    // ---- subscriptions -------------------------------------------------

    pub fn add_equity(&mut self, ticker: &str, resolution: Resolution) {
        self.subscription_requests
            .push(SubscriptionRequest::equity(ticker, resolution));
    }

    pub fn add_subscription(&mut self, request: SubscriptionRequest) {
        self.subscription_requests.push(request);
    }

    /// Registers a consolidator deriving coarser bars from primary data.
    /// Consolidated closes arrive in `slice.consolidator_updates`.
    pub fn add_consolidator(&self, consolidator: ConsolidatorEnum) {
        self.history.write().unwrap().add_consolidator(consolidator);
    }

    // ---- history -------------------------------------------------------

    pub fn bar_history(&self, symbol: &Symbol) -> Option<RollingWindow<TradeBar>> {
        self.history.read().unwrap().bar_history(symbol).cloned()
    }

    pub fn quote_history(&self, symbol: &Symbol) -> Option<RollingWindow<QuoteBar>> {
        self.history.read().unwrap().quote_history(symbol).cloned()
    }

    pub fn tick_history(&self, symbol: &Symbol) -> Option<RollingWindow<Tick>> {
        self.history.read().unwrap().tick_history(symbol).cloned()
    }

    // ---- orders --------------------------------------------------------

    pub fn market_order(&self, symbol: Symbol, quantity: Decimal) -> OrderTicket {
        self.transactions
            .submit_order(SubmitOrderRequest::market(symbol, quantity, self.time_utc()))
    }

    pub fn limit_order(&self, symbol: Symbol, quantity: Decimal, limit_price: Price) -> OrderTicket {
        self.transactions.submit_order(SubmitOrderRequest::limit(
            symbol,
            quantity,
            limit_price,
            self.time_utc(),
        ))
    }

    pub fn stop_market_order(
        &self,
        symbol: Symbol,
        quantity: Decimal,
        stop_price: Price,
    ) -> OrderTicket {
        self.transactions.submit_order(SubmitOrderRequest::stop_market(
            symbol,
            quantity,
            stop_price,
            self.time_utc(),
        ))
    }

    pub fn submit_order(&self, request: SubmitOrderRequest) -> OrderTicket {
        self.transactions.submit_order(request)
    }

    pub fn update_order(&self, request: UpdateOrderRequest) {
        if let Some(ticket) = self.transactions.ticket(request.order_id) {
            ticket.update(request);
        }
    }

    pub fn cancel_order(&self, order_id: OrderId) {
        if let Some(ticket) = self.transactions.ticket(order_id) {
            ticket.cancel(self.time_utc());
        }
    }

    pub fn ticket(&self, order_id: OrderId) -> Option<OrderTicket> {
        self.transactions.ticket(order_id)
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.transactions.open_orders()
    }

    // ---- portfolio queries ---------------------------------------------

    /// The book as of the start of the current callback.
    pub fn portfolio(&self) -> &LedgerSnapshot {
        &self.ledger_snapshot
    }

    pub fn quantity(&self, symbol: &Symbol) -> Decimal {
        self.ledger_snapshot
            .holdings
            .iter()
            .find(|h| &h.symbol == symbol)
            .map(|h| h.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total_portfolio_value(&self) -> Decimal {
        self.ledger_snapshot.total_portfolio_value
    }

    // ---- output --------------------------------------------------------

    pub fn plot(&mut self, chart: &str, series: &str, value: Price) {
        let time_unix = self.time_utc().timestamp();
        self.charts.plot(chart, series, time_unix, value);
    }

    pub fn debug(&self, message: &str) {
        self.results.debug(message, false);
    }

    pub fn error(&self, message: &str) {
        self.results.handled_error(message, "");
    }

    // ---- scheduling ----------------------------------------------------

    pub fn schedule_event(&mut self, event: TimedEvent) {
        self.scheduled_additions.push(event);
    }

    pub fn cancel_scheduled_event(&mut self, name: &str) {
        self.scheduled_cancellations.push(name.to_string());
    }

    // ---- lifecycle -----------------------------------------------------

    /// Requests a graceful stop at the next loop iteration.
    pub fn quit(&mut self, reason: &str) {
        self.stop_requested = Some(reason.to_string());
    }
}

/// The author-supplied strategy. Every callback runs on the engine thread
/// against a consistent portfolio, returning an error transitions the run to
/// `RuntimeError` instead of panicking across the boundary.
#[allow(unused_variables)]
pub trait Algorithm: Send {
    fn initialize(&mut self, api: &mut StrategyApi) -> Result<(), EngineError>;

    fn on_data(&mut self, slice: &TimeSlice, api: &mut StrategyApi) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_securities_changed(
        &mut self,
        changes: &SecurityChanges,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_order_event(&mut self, event: &OrderEvent, api: &mut StrategyApi) -> Result<(), EngineError> {
        Ok(())
    }

    /// Margin call hook: the engine passes the liquidation requests it is
    /// about to submit, the algorithm may adjust or clear them.
    fn on_margin_call(
        &mut self,
        requests: &mut Vec<SubmitOrderRequest>,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_end_of_day(&mut self, symbol: &Symbol, api: &mut StrategyApi) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_scheduled_event(
        &mut self,
        name: &str,
        fire_time: DateTime<Utc>,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_brokerage_message(
        &mut self,
        message: &BrokerMessage,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        Ok(())
    }
}
