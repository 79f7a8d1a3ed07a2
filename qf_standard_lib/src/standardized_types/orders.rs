use crate::standardized_types::new_types::{Price, Volume};
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use strum_macros::Display;

pub type OrderId = u64;

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug, Display, Hash)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    MarketOnOpen,
    MarketOnClose,
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug, Display, Hash)]
pub enum OrderStatus {
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
    CancelPending,
    Updated,
}

impl OrderStatus {
    /// Terminal statuses are absorbing, all further requests on the id fail.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid
        )
    }
}

/// Legal transitions of the order lifecycle. `Updated` and `CancelPending`
/// are transient acknowledgments that settle back into `Submitted` or a
/// terminal state.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    if from.is_closed() {
        return false;
    }
    match (from, to) {
        (New, Submitted) | (New, Invalid) => true,
        (Submitted, PartiallyFilled)
        | (Submitted, Filled)
        | (Submitted, Canceled)
        | (Submitted, Invalid)
        | (Submitted, Updated)
        | (Submitted, CancelPending)
        | (Submitted, Submitted) => true,
        (PartiallyFilled, PartiallyFilled)
        | (PartiallyFilled, Filled)
        | (PartiallyFilled, Canceled)
        | (PartiallyFilled, CancelPending)
        | (PartiallyFilled, Updated)
        | (PartiallyFilled, Invalid) => true,
        (Updated, Submitted)
        | (Updated, PartiallyFilled)
        | (Updated, Filled)
        | (Updated, Canceled)
        | (Updated, Invalid) => true,
        (CancelPending, Canceled) | (CancelPending, Filled) | (CancelPending, PartiallyFilled) => {
            true
        }
        _ => false,
    }
}

/// A working order. Quantity is signed, negative sells. Owned by the
/// transaction handler, everything else sees clones or ticket snapshots.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Order {
    pub id: OrderId,
    pub broker_ids: Vec<String>,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub created_utc: DateTime<Utc>,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub tag: String,
    pub filled_quantity: Decimal,
}

impl Order {
    pub fn from_submit(id: OrderId, request: &SubmitOrderRequest) -> Self {
        Order {
            id,
            broker_ids: Vec::new(),
            symbol: request.symbol.clone(),
            quantity: request.quantity,
            order_type: request.order_type,
            status: OrderStatus::New,
            created_utc: request.utc_time,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            tag: request.tag.clone(),
            filled_quantity: dec!(0),
        }
    }

    pub fn is_buy(&self) -> bool {
        self.quantity > dec!(0)
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order #{} {} {} {} [{}]",
            self.id, self.order_type, self.symbol, self.quantity, self.status
        )
    }
}

#[derive(Clone, Debug)]
pub struct SubmitOrderRequest {
    pub order_type: OrderType,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub tag: String,
    pub utc_time: DateTime<Utc>,
}

impl SubmitOrderRequest {
    pub fn market(symbol: Symbol, quantity: Decimal, utc_time: DateTime<Utc>) -> Self {
        SubmitOrderRequest {
            order_type: OrderType::Market,
            symbol,
            quantity,
            limit_price: None,
            stop_price: None,
            tag: String::new(),
            utc_time,
        }
    }

    pub fn limit(
        symbol: Symbol,
        quantity: Decimal,
        limit_price: Price,
        utc_time: DateTime<Utc>,
    ) -> Self {
        SubmitOrderRequest {
            order_type: OrderType::Limit,
            symbol,
            quantity,
            limit_price: Some(limit_price),
            stop_price: None,
            tag: String::new(),
            utc_time,
        }
    }

    pub fn stop_market(
        symbol: Symbol,
        quantity: Decimal,
        stop_price: Price,
        utc_time: DateTime<Utc>,
    ) -> Self {
        SubmitOrderRequest {
            order_type: OrderType::StopMarket,
            symbol,
            quantity,
            limit_price: None,
            stop_price: Some(stop_price),
            tag: String::new(),
            utc_time,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UpdateOrderRequest {
    pub order_id: OrderId,
    pub quantity: Option<Decimal>,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub tag: Option<String>,
    pub utc_time: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct CancelOrderRequest {
    pub order_id: OrderId,
    pub utc_time: DateTime<Utc>,
}

/// Requests entering the transaction handler's bounded queue. Submits carry
/// the pre-allocated id so the caller's ticket and the stored order agree.
#[derive(Clone, Debug)]
pub enum OrderRequest {
    Submit(OrderId, SubmitOrderRequest),
    Update(UpdateOrderRequest),
    Cancel(CancelOrderRequest),
}

/// Outcome of processing one request, appended to the ticket's history.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderResponse {
    Success {
        order_id: OrderId,
        utc_time: DateTime<Utc>,
    },
    Error {
        order_id: OrderId,
        utc_time: DateTime<Utc>,
        message: String,
    },
}

impl OrderResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, OrderResponse::Error { .. })
    }
}

/// Emitted by the brokerage whenever an order's state advances. Events for a
/// single order are strictly ordered by emission.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub utc_time: DateTime<Utc>,
    pub status: OrderStatus,
    pub fill_quantity: Volume,
    pub fill_price: Price,
    pub fill_price_currency: String,
    pub message: Option<String>,
    pub order_fee: Price,
}

impl OrderEvent {
    pub fn new(
        order_id: OrderId,
        symbol: Symbol,
        utc_time: DateTime<Utc>,
        status: OrderStatus,
    ) -> Self {
        OrderEvent {
            order_id,
            symbol,
            utc_time,
            status,
            fill_quantity: dec!(0),
            fill_price: dec!(0),
            fill_price_currency: String::new(),
            message: None,
            order_fee: dec!(0),
        }
    }

    pub fn with_fill(mut self, quantity: Volume, price: Price) -> Self {
        self.fill_quantity = quantity;
        self.fill_price = price;
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            OrderStatus::Filled | OrderStatus::PartiallyFilled => write!(
                f,
                "Order #{} {}: {} x {} @ {}",
                self.order_id, self.status, self.symbol, self.fill_quantity, self.fill_price
            ),
            _ => write!(f, "Order #{} {}: {}", self.order_id, self.status, self.symbol),
        }
    }
}

struct TicketState {
    order: Order,
    responses: Vec<OrderResponse>,
}

/// The caller's handle to a working order: a live snapshot of the mutable
/// order plus the append-only response history. Updates and cancels travel
/// back through the transaction handler, the ticket itself never mutates
/// order state directly.
#[derive(Clone)]
pub struct OrderTicket {
    order_id: OrderId,
    state: Arc<RwLock<TicketState>>,
    request_queue: Arc<Mutex<Vec<OrderRequest>>>,
}

impl OrderTicket {
    pub(crate) fn new(order: Order, request_queue: Arc<Mutex<Vec<OrderRequest>>>) -> Self {
        OrderTicket {
            order_id: order.id,
            state: Arc::new(RwLock::new(TicketState {
                order,
                responses: Vec::new(),
            })),
            request_queue,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn status(&self) -> OrderStatus {
        self.state.read().unwrap().order.status
    }

    pub fn order(&self) -> Order {
        self.state.read().unwrap().order.clone()
    }

    pub fn filled_quantity(&self) -> Decimal {
        self.state.read().unwrap().order.filled_quantity
    }

    pub fn latest_response(&self) -> Option<OrderResponse> {
        self.state.read().unwrap().responses.last().cloned()
    }

    pub fn responses(&self) -> Vec<OrderResponse> {
        self.state.read().unwrap().responses.clone()
    }

    /// Queues an update request for the transaction handler's next pump.
    pub fn update(&self, request: UpdateOrderRequest) {
        self.request_queue
            .lock()
            .unwrap()
            .push(OrderRequest::Update(request));
    }

    /// Queues a cancel request. Idempotent, canceling a closed order records
    /// a failed response.
    pub fn cancel(&self, utc_time: DateTime<Utc>) {
        self.request_queue
            .lock()
            .unwrap()
            .push(OrderRequest::Cancel(CancelOrderRequest {
                order_id: self.order_id,
                utc_time,
            }));
    }

    pub(crate) fn record_response(&self, response: OrderResponse) {
        self.state.write().unwrap().responses.push(response);
    }

    pub(crate) fn sync_order(&self, order: &Order) {
        self.state.write().unwrap().order = order.clone();
    }
}
