pub mod candlesticks;
pub mod quotebars;

use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use crate::strategies::consolidators::candlesticks::CandlestickConsolidator;
use crate::strategies::consolidators::quotebars::QuoteBarConsolidator;
use chrono::{DateTime, Utc};

/// The result of feeding one primary item through a consolidator: a bar that
/// just closed, if any, plus the still-open working bar.
pub struct ConsolidatedData {
    pub closed: Option<BaseDataEnum>,
    pub open: Option<BaseDataEnum>,
}

pub enum ConsolidatorEnum {
    Candles(CandlestickConsolidator),
    QuoteBars(QuoteBarConsolidator),
}

impl ConsolidatorEnum {
    pub fn subscription(&self) -> &SubscriptionDataConfig {
        match self {
            ConsolidatorEnum::Candles(c) => &c.target,
            ConsolidatorEnum::QuoteBars(c) => &c.target,
        }
    }

    pub fn update(&mut self, data: &BaseDataEnum) -> ConsolidatedData {
        match self {
            ConsolidatorEnum::Candles(c) => c.update(data),
            ConsolidatorEnum::QuoteBars(c) => c.update(data),
        }
    }

    /// Time-only advance: closes the working bar when its period has lapsed
    /// even though no new primary data arrived.
    pub fn update_time(&mut self, time: DateTime<Utc>) -> Option<BaseDataEnum> {
        match self {
            ConsolidatorEnum::Candles(c) => c.update_time(time),
            ConsolidatorEnum::QuoteBars(c) => c.update_time(time),
        }
    }
}
