use crate::errors::EngineError;
use crate::standardized_types::orders::{
    is_valid_transition, Order, OrderEvent, OrderId, OrderRequest, OrderResponse, OrderStatus,
    OrderTicket, SubmitOrderRequest,
};
use crate::standardized_types::securities::SecurityMap;
use crate::strategies::handlers::market_handler::backtest_matching_engine::SimulatedBrokerage;
use crate::strategies::ledgers::Ledger;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{error, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const REQUEST_QUEUE_CAPACITY: usize = 1024;

/// Single writer over order and portfolio state. Requests enter through a
/// bounded queue, processing happens on the engine thread when the loop
/// pumps the handler, order events apply to the ledger in emission order.
pub struct TransactionHandler {
    next_order_id: AtomicU64,
    orders: DashMap<OrderId, Order>,
    tickets: DashMap<OrderId, OrderTicket>,
    request_queue: Arc<Mutex<Vec<OrderRequest>>>,
    brokerage: Arc<SimulatedBrokerage>,
}

impl TransactionHandler {
    pub fn new(brokerage: Arc<SimulatedBrokerage>) -> Self {
        TransactionHandler {
            next_order_id: AtomicU64::new(1),
            orders: DashMap::new(),
            tickets: DashMap::new(),
            request_queue: Arc::new(Mutex::new(Vec::new())),
            brokerage,
        }
    }

    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.orders.get(&order_id).map(|o| o.clone())
    }

    pub fn ticket(&self, order_id: OrderId) -> Option<OrderTicket> {
        self.tickets.get(&order_id).map(|t| t.clone())
    }

    pub fn open_orders(&self) -> Vec<Order> {
        let mut open: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| !o.status.is_closed())
            .map(|o| o.clone())
            .collect();
        open.sort_by_key(|o| o.id);
        open
    }

    pub fn all_orders(&self) -> Vec<Order> {
        let mut all: Vec<Order> = self.orders.iter().map(|o| o.clone()).collect();
        all.sort_by_key(|o| o.id);
        all
    }

    /// Allocates the next id, records the `New` order and returns its
    /// ticket. The request is queued for the next pump, which forwards it to
    /// the brokerage.
    pub fn submit_order(&self, request: SubmitOrderRequest) -> OrderTicket {
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let order = Order::from_submit(order_id, &request);
        let ticket = OrderTicket::new(order.clone(), self.request_queue.clone());
        self.orders.insert(order_id, order);
        self.tickets.insert(order_id, ticket.clone());

        let mut queue = self.request_queue.lock().unwrap();
        if queue.len() >= REQUEST_QUEUE_CAPACITY {
            error!("Transaction Handler: request queue full, dropping submit #{}", order_id);
            ticket.record_response(OrderResponse::Error {
                order_id,
                utc_time: request.utc_time,
                message: "Request queue full".to_string(),
            });
            return ticket;
        }
        queue.push(OrderRequest::Submit(order_id, request));
        ticket
    }

    /// Drains the request queue in arrival order and forwards each to the
    /// brokerage, then applies the resulting events. Returns every event for
    /// delivery to the algorithm and the result channel.
    pub fn process_requests(
        &self,
        utc_time: DateTime<Utc>,
        securities: &SecurityMap,
        ledger: &mut Ledger,
    ) -> Vec<OrderEvent> {
        let requests: Vec<OrderRequest> = {
            let mut queue = self.request_queue.lock().unwrap();
            queue.drain(..).collect()
        };

        let mut events = Vec::new();
        for request in requests {
            match request {
                OrderRequest::Submit(order_id, _submit) => {
                    let order = match self.orders.get(&order_id) {
                        Some(order) => order.clone(),
                        None => continue,
                    };
                    // Parameter validation ahead of the market: bad orders go
                    // Invalid without ever reaching the pending set.
                    if let Some(security) = securities.get(&order.symbol) {
                        if let Err(reason) = self
                            .brokerage
                            .brokerage_model()
                            .can_submit_order(&security, &order)
                        {
                            events.push(
                                OrderEvent::new(order_id, order.symbol.clone(), utc_time, OrderStatus::Invalid)
                                    .with_message(&reason),
                            );
                            self.record_failure(order_id, utc_time, &reason);
                            continue;
                        }
                    }
                    match self.brokerage.place_order(&order, utc_time) {
                        Some(event) => {
                            self.record_success(order_id, utc_time);
                            events.push(event);
                        }
                        None => {
                            self.record_failure(order_id, utc_time, "Brokerage refused order");
                        }
                    }
                }
                OrderRequest::Update(update) => {
                    let order_id = update.order_id;
                    let mut stored = match self.orders.get_mut(&order_id) {
                        Some(order) => order,
                        None => {
                            warn!("Transaction Handler: update for unknown order #{}", order_id);
                            continue;
                        }
                    };
                    if stored.status.is_closed() {
                        let message = format!("Cannot update {} order", stored.status);
                        drop(stored);
                        self.record_failure(order_id, utc_time, &message);
                        continue;
                    }
                    if let Some(quantity) = update.quantity {
                        stored.quantity = quantity;
                    }
                    if let Some(limit) = update.limit_price {
                        stored.limit_price = Some(limit);
                    }
                    if let Some(stop) = update.stop_price {
                        stored.stop_price = Some(stop);
                    }
                    if let Some(tag) = update.tag {
                        stored.tag = tag;
                    }
                    let updated = stored.clone();
                    drop(stored);
                    match self.brokerage.update_order(&updated, utc_time) {
                        Some(event) => {
                            self.record_success(order_id, utc_time);
                            events.push(event);
                        }
                        None => {
                            self.record_failure(order_id, utc_time, "No pending order to update");
                        }
                    }
                }
                OrderRequest::Cancel(cancel) => {
                    let order_id = cancel.order_id;
                    let closed = self
                        .orders
                        .get(&order_id)
                        .map(|o| o.status.is_closed())
                        .unwrap_or(true);
                    if closed {
                        self.record_failure(order_id, utc_time, "Cannot cancel closed order");
                        continue;
                    }
                    match self.brokerage.cancel_order(order_id, utc_time) {
                        Some(event) => {
                            self.record_success(order_id, utc_time);
                            events.push(event);
                        }
                        None => {
                            self.record_failure(order_id, utc_time, "No pending order to cancel");
                        }
                    }
                }
            }
        }

        self.apply_order_events(&events, securities, ledger);
        events
    }

    /// Runs the brokerage scan against the current slice and settles the
    /// produced events into the order book and ledger.
    pub fn scan_and_settle(
        &self,
        utc_time: DateTime<Utc>,
        securities: &SecurityMap,
        ledger: &mut Ledger,
    ) -> Vec<OrderEvent> {
        let events = self.brokerage.scan(utc_time, securities, ledger);
        self.apply_order_events(&events, securities, ledger);
        events
    }

    fn apply_order_events(&self, events: &[OrderEvent], securities: &SecurityMap, ledger: &mut Ledger) {
        for event in events {
            let current_status = match self.orders.get(&event.order_id) {
                Some(order) => order.status,
                None => {
                    warn!("Transaction Handler: event for unknown order #{}", event.order_id);
                    continue;
                }
            };
            if !is_valid_transition(current_status, event.status) {
                warn!(
                    "Order #{}: dropping illegal transition {} -> {}",
                    event.order_id, current_status, event.status
                );
                continue;
            }

            // The ledger is the gate: nothing is committed to the order until
            // the fill applies cleanly, so a failed event leaves both the
            // book and the order exactly as they were.
            if event.fill_quantity != rust_decimal_macros::dec!(0) {
                let properties = match securities.get(&event.symbol) {
                    Some(security) => security.properties.clone(),
                    None => crate::standardized_types::securities::SymbolProperties::default_equity(),
                };
                if let Err(e) = ledger.apply_fill(event, &properties) {
                    error!("Order #{}: {}", event.order_id, e);
                    if let Some(mut order) = self.orders.get_mut(&event.order_id) {
                        order.status = OrderStatus::Invalid;
                    }
                    self.record_failure(event.order_id, event.utc_time, &e.to_string());
                    continue;
                }
            }

            let snapshot = match self.orders.get_mut(&event.order_id) {
                Some(mut order) => {
                    order.status = event.status;
                    order.filled_quantity += event.fill_quantity;
                    order.clone()
                }
                None => continue,
            };

            if let Some(ticket) = self.tickets.get(&event.order_id) {
                ticket.sync_order(&snapshot);
                ticket.record_response(OrderResponse::Success {
                    order_id: event.order_id,
                    utc_time: event.utc_time,
                });
            }
        }
    }

    fn record_success(&self, order_id: OrderId, utc_time: DateTime<Utc>) {
        if let Some(ticket) = self.tickets.get(&order_id) {
            ticket.record_response(OrderResponse::Success { order_id, utc_time });
        }
    }

    fn record_failure(&self, order_id: OrderId, utc_time: DateTime<Utc>, message: &str) {
        if let Some(mut order) = self.orders.get_mut(&order_id) {
            if order.status == OrderStatus::New {
                order.status = OrderStatus::Invalid;
            }
        }
        if let Some(ticket) = self.tickets.get(&order_id) {
            if let Some(order) = self.orders.get(&order_id) {
                ticket.sync_order(&order);
            }
            ticket.record_response(OrderResponse::Error {
                order_id,
                utc_time,
                message: message.to_string(),
            });
        }
    }
}

/// Failure to apply an event is surfaced through the ticket, this type is
/// kept for callers that need a typed error.
pub type TransactionResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
    use crate::standardized_types::base_data::trade_bar::TradeBar;
    use crate::standardized_types::enums::SecurityType;
    use crate::standardized_types::market_hours::MarketHoursDatabase;
    use crate::standardized_types::resolution::Resolution;
    use crate::standardized_types::securities::{Security, SymbolProperties};
    use crate::standardized_types::symbols::{SecurityIdentifier, Symbol};
    use crate::strategies::handlers::market_handler::brokerage_models::DefaultBrokerageModel;
    use crate::strategies::handlers::market_handler::fill_models::ImmediateFillModel;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string())
    }

    fn handler() -> TransactionHandler {
        TransactionHandler::new(Arc::new(SimulatedBrokerage::new(
            Box::new(ImmediateFillModel),
            Arc::new(DefaultBrokerageModel::default()),
        )))
    }

    fn securities_with_bar(close: rust_decimal::Decimal, time: DateTime<Utc>) -> SecurityMap {
        let hours = MarketHoursDatabase::new()
            .get("usa", SecurityType::Equity, None)
            .unwrap();
        let mut security = Security::new(symbol(), hours, SymbolProperties::default_equity());
        let bar = TradeBar::new(
            symbol(),
            close, close + dec!(0.5), close - dec!(0.5), close,
            dec!(1000),
            time,
            Resolution::Minute,
        );
        security.update(&BaseDataEnum::TradeBar(bar));
        let map: SecurityMap = Arc::new(DashMap::new());
        map.insert(symbol(), security);
        map
    }

    #[test]
    fn order_ids_are_strictly_increasing_from_one() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let a = handler.submit_order(SubmitOrderRequest::market(symbol(), dec!(1), t0));
        let b = handler.submit_order(SubmitOrderRequest::market(symbol(), dec!(1), t0));
        let c = handler.submit_order(SubmitOrderRequest::market(symbol(), dec!(1), t0));
        assert_eq!(a.order_id(), 1);
        assert_eq!(b.order_id(), 2);
        assert_eq!(c.order_id(), 3);
    }

    #[test]
    fn market_order_fills_on_next_bar() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let t1 = t0 + chrono::Duration::minutes(1);
        let mut ledger = Ledger::new("USD", dec!(100_000));

        let ticket = handler.submit_order(SubmitOrderRequest::market(symbol(), dec!(10), t0));
        let securities = securities_with_bar(dec!(150), t0);
        let submit_events = handler.process_requests(t0, &securities, &mut ledger);
        assert_eq!(submit_events.len(), 1);
        assert_eq!(submit_events[0].status, OrderStatus::Submitted);
        assert_eq!(ticket.status(), OrderStatus::Submitted);

        let fill_events = handler.scan_and_settle(t1, &securities, &mut ledger);
        assert_eq!(fill_events.len(), 1);
        assert_eq!(fill_events[0].status, OrderStatus::Filled);
        assert_eq!(fill_events[0].fill_quantity, dec!(10));
        assert_eq!(ticket.status(), OrderStatus::Filled);
        assert_eq!(ticket.filled_quantity(), dec!(10));

        // Portfolio applied: 10 shares at 150 plus the 1 minimum fee.
        assert_eq!(ledger.quantity(&symbol()), dec!(10));
        assert_eq!(
            ledger.cash_book().get("USD").unwrap().amount,
            dec!(100_000) - dec!(1500) - dec!(1)
        );
    }

    #[test]
    fn cancel_before_fill_settles_canceled() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let securities = securities_with_bar(dec!(150), t0);

        let ticket = handler.submit_order(SubmitOrderRequest::limit(symbol(), dec!(10), dec!(100), t0));
        handler.process_requests(t0, &securities, &mut ledger);
        ticket.cancel(t0);
        let events = handler.process_requests(t0, &securities, &mut ledger);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Canceled);
        assert_eq!(ticket.status(), OrderStatus::Canceled);

        // Scanning afterwards produces nothing.
        let t1 = t0 + chrono::Duration::minutes(1);
        assert!(handler.scan_and_settle(t1, &securities, &mut ledger).is_empty());
    }

    #[test]
    fn requests_on_terminal_orders_fail_via_ticket() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let t1 = t0 + chrono::Duration::minutes(1);
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let securities = securities_with_bar(dec!(150), t0);

        let ticket = handler.submit_order(SubmitOrderRequest::market(symbol(), dec!(10), t0));
        handler.process_requests(t0, &securities, &mut ledger);
        handler.scan_and_settle(t1, &securities, &mut ledger);
        assert_eq!(ticket.status(), OrderStatus::Filled);

        ticket.cancel(t1);
        handler.process_requests(t1, &securities, &mut ledger);
        let last = ticket.latest_response().unwrap();
        assert!(last.is_error());
        assert_eq!(ticket.status(), OrderStatus::Filled);
    }

    #[test]
    fn update_reprices_pending_limit() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let t1 = t0 + chrono::Duration::minutes(1);
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let securities = securities_with_bar(dec!(150), t0);

        let ticket = handler.submit_order(SubmitOrderRequest::limit(symbol(), dec!(10), dec!(100), t0));
        handler.process_requests(t0, &securities, &mut ledger);

        ticket.update(crate::standardized_types::orders::UpdateOrderRequest {
            order_id: ticket.order_id(),
            quantity: None,
            limit_price: Some(dec!(155)),
            stop_price: None,
            tag: None,
            utc_time: t0,
        });
        let events = handler.process_requests(t0, &securities, &mut ledger);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Submitted);

        // The raised limit crosses on the next scan.
        let events = handler.scan_and_settle(t1, &securities, &mut ledger);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Filled);
        assert_eq!(events[0].fill_price, dec!(150));
    }

    #[test]
    fn failed_portfolio_application_reverts_the_order() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let securities = securities_with_bar(dec!(150), t0);

        let ticket = handler.submit_order(SubmitOrderRequest::market(symbol(), dec!(10), t0));
        handler.process_requests(t0, &securities, &mut ledger);
        assert_eq!(ticket.status(), OrderStatus::Submitted);

        // A fill the ledger refuses: the order goes Invalid with nothing
        // committed, neither status-to-Filled nor filled quantity.
        let bad_fill = OrderEvent::new(ticket.order_id(), symbol(), t0, OrderStatus::Filled)
            .with_fill(dec!(10), dec!(0));
        handler.apply_order_events(&[bad_fill], &securities, &mut ledger);

        let order = handler.order(ticket.order_id()).unwrap();
        assert_eq!(order.status, OrderStatus::Invalid);
        assert_eq!(order.filled_quantity, dec!(0));
        assert_eq!(ledger.total_portfolio_value(), dec!(100_000));
        assert!(ledger.holding(&symbol()).is_none());
        assert_eq!(ticket.status(), OrderStatus::Invalid);
        assert!(ticket.latest_response().unwrap().is_error());
    }

    #[test]
    fn invalid_parameters_never_reach_the_market() {
        let handler = handler();
        let t0 = New_York.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap().to_utc();
        let mut ledger = Ledger::new("USD", dec!(100_000));
        let securities = securities_with_bar(dec!(150), t0);

        let mut request = SubmitOrderRequest::market(symbol(), dec!(10), t0);
        request.order_type = crate::standardized_types::orders::OrderType::Limit;
        let ticket = handler.submit_order(request);
        let events = handler.process_requests(t0, &securities, &mut ledger);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Invalid);
        assert_eq!(ticket.status(), OrderStatus::Invalid);
    }
}
