use crate::standardized_types::base_data::base_data_type::BaseDataType;
use crate::standardized_types::new_types::MarketName;
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::symbols::Symbol;
use chrono_tz::Tz;
use std::fmt;

/// Handle to a subscription inside the feed's subscription arena. All cross
/// component references to subscriptions travel as these ids, never as
/// shared pointers into the arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Everything needed to service one data stream for one instrument. Immutable
/// after creation, a changed requirement means a new subscription.
#[derive(Clone, PartialEq, Debug)]
pub struct SubscriptionDataConfig {
    pub symbol: Symbol,
    pub resolution: Resolution,
    pub data_type: BaseDataType,
    pub market: MarketName,
    /// Zone the on-disk timestamps are expressed in.
    pub data_time_zone: Tz,
    /// Zone the instrument's tradeable hours are defined in.
    pub exchange_time_zone: Tz,
    pub fill_forward: bool,
    pub extended_hours: bool,
    /// Internal feeds (currency conversion pairs and the like) are invisible
    /// to the algorithm, their data never reaches `on_data`.
    pub is_internal_feed: bool,
    pub is_custom_data: bool,
}

impl SubscriptionDataConfig {
    pub fn new(
        symbol: Symbol,
        resolution: Resolution,
        data_type: BaseDataType,
        market: MarketName,
        data_time_zone: Tz,
        exchange_time_zone: Tz,
    ) -> Self {
        SubscriptionDataConfig {
            symbol,
            resolution,
            data_type,
            market,
            data_time_zone,
            exchange_time_zone,
            fill_forward: false,
            extended_hours: false,
            is_internal_feed: false,
            is_custom_data: false,
        }
    }

    pub fn with_fill_forward(mut self) -> Self {
        self.fill_forward = true;
        self
    }

    pub fn with_extended_hours(mut self) -> Self {
        self.extended_hours = true;
        self
    }

    pub fn as_internal_feed(mut self) -> Self {
        self.is_internal_feed = true;
        self
    }

    pub fn as_custom_data(mut self) -> Self {
        self.is_custom_data = true;
        self
    }
}

impl fmt::Display for SubscriptionDataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.symbol, self.market, self.resolution, self.data_type
        )
    }
}

/// Emitted when subscriptions change mid stream so interested handlers can
/// react without polling the active set.
#[derive(Clone, Debug)]
pub enum DataSubscriptionEvent {
    Subscribed(SubscriptionId, SubscriptionDataConfig),
    Unsubscribed(SubscriptionId, SubscriptionDataConfig),
    FailedToSubscribe(SubscriptionDataConfig, String),
}

impl fmt::Display for DataSubscriptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSubscriptionEvent::Subscribed(id, config) => {
                write!(f, "Subscribed: {} as {}", config, id)
            }
            DataSubscriptionEvent::Unsubscribed(id, config) => {
                write!(f, "Unsubscribed: {} as {}", config, id)
            }
            DataSubscriptionEvent::FailedToSubscribe(config, reason) => {
                write!(f, "Failed to subscribe: {}: {}", config, reason)
            }
        }
    }
}
