use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::base_data::quote_bar::QuoteBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use crate::strategies::consolidators::ConsolidatedData;
use chrono::{DateTime, DurationRound, Utc};

/// Builds coarser quote bars from finer ones, keeping both sides' extremes.
pub struct QuoteBarConsolidator {
    pub target: SubscriptionDataConfig,
    current: Option<QuoteBar>,
}

impl QuoteBarConsolidator {
    pub fn new(target: SubscriptionDataConfig) -> Self {
        QuoteBarConsolidator {
            target,
            current: None,
        }
    }

    pub fn update(&mut self, data: &BaseDataEnum) -> ConsolidatedData {
        let incoming = match data {
            BaseDataEnum::QuoteBar(bar) if bar.symbol == self.target.symbol => bar,
            _ => {
                return ConsolidatedData {
                    closed: None,
                    open: self.current.clone().map(BaseDataEnum::QuoteBar),
                }
            }
        };

        let mut closed = None;
        if let Some(current) = &self.current {
            if incoming.time >= current.time + self.target.resolution.as_duration() {
                closed = self.current.take().map(BaseDataEnum::QuoteBar);
            }
        }

        match &mut self.current {
            Some(current) => {
                current.bid.high = current.bid.high.max(incoming.bid.high);
                current.bid.low = current.bid.low.min(incoming.bid.low);
                current.bid.close = incoming.bid.close;
                current.ask.high = current.ask.high.max(incoming.ask.high);
                current.ask.low = current.ask.low.min(incoming.ask.low);
                current.ask.close = incoming.ask.close;
                current.bid_size = incoming.bid_size;
                current.ask_size = incoming.ask_size;
            }
            None => {
                let open_time = incoming
                    .time
                    .duration_trunc(self.target.resolution.as_duration())
                    .unwrap_or(incoming.time);
                let mut bar = QuoteBar::new(
                    self.target.symbol.clone(),
                    incoming.bid.clone(),
                    incoming.ask.clone(),
                    open_time,
                    self.target.resolution,
                );
                bar.bid_size = incoming.bid_size;
                bar.ask_size = incoming.ask_size;
                self.current = Some(bar);
            }
        }

        ConsolidatedData {
            closed,
            open: self.current.clone().map(BaseDataEnum::QuoteBar),
        }
    }

    pub fn update_time(&mut self, time: DateTime<Utc>) -> Option<BaseDataEnum> {
        if let Some(current) = &self.current {
            if time >= current.time + self.target.resolution.as_duration() {
                return self.current.take().map(BaseDataEnum::QuoteBar);
            }
        }
        None
    }
}
