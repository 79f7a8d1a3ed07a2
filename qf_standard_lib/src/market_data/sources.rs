use crate::errors::EngineError;
use crate::market_data::codecs::{
    decode_daily_hour_csv, decode_intraday_csv, decode_quote_intraday_csv, decode_tick_csv,
    decode_universe_csv,
};
use crate::market_data::compression::read_zip_entry;
use crate::market_data::file_paths::{day_zip_path, single_file_zip_path};
use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::base_data::base_data_type::BaseDataType;
use crate::standardized_types::base_data::custom::CustomDecoder;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::market_hours::MarketHours;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use chrono::{DateTime, Utc};
use log::warn;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;

const READER_CHANNEL_CAPACITY: usize = 2048;

/// One pull from a lazy data source.
pub enum SourcePoll {
    Data(BaseDataEnum),
    /// Live feeds only: nothing buffered right now, try again later.
    NotReady,
    /// The source is exhausted and will never yield again.
    End,
}

/// The lazy, finite, non-restartable producer behind a subscription. Items
/// must come out in non-decreasing `end_time` UTC, ties allowed.
pub trait DataSource: Send {
    fn next(&mut self) -> Result<SourcePoll, EngineError>;
}

/// In-memory source for tests and synthetic feeds.
pub struct VecDataSource {
    items: VecDeque<BaseDataEnum>,
}

impl VecDataSource {
    pub fn new(items: Vec<BaseDataEnum>) -> Self {
        VecDataSource {
            items: items.into(),
        }
    }
}

impl DataSource for VecDataSource {
    fn next(&mut self) -> Result<SourcePoll, EngineError> {
        match self.items.pop_front() {
            Some(item) => Ok(SourcePoll::Data(item)),
            None => Ok(SourcePoll::End),
        }
    }
}

/// Live push source: a bounded channel whose sender side belongs to the
/// connection adapter. An empty channel reports `NotReady`, a dropped sender
/// ends the stream.
pub struct ChannelDataSource {
    receiver: Receiver<BaseDataEnum>,
}

pub fn live_channel(capacity: usize) -> (SyncSender<BaseDataEnum>, ChannelDataSource) {
    let (sender, receiver) = sync_channel(capacity);
    (sender, ChannelDataSource { receiver })
}

impl DataSource for ChannelDataSource {
    fn next(&mut self) -> Result<SourcePoll, EngineError> {
        match self.receiver.try_recv() {
            Ok(data) => Ok(SourcePoll::Data(data)),
            Err(TryRecvError::Empty) => Ok(SourcePoll::NotReady),
            Err(TryRecvError::Disconnected) => Ok(SourcePoll::End),
        }
    }
}

/// Reads zipped CSV archives on a dedicated thread, feeding a bounded channel
/// so disk latency overlaps with engine work while memory stays bounded. The
/// iterator is positioned at `start_utc`: items known before it are dropped
/// by the reader.
pub struct FileDataSource {
    receiver: Receiver<Result<BaseDataEnum, EngineError>>,
}

impl FileDataSource {
    pub fn new(
        data_directory: PathBuf,
        config: SubscriptionDataConfig,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        market_hours: Arc<MarketHours>,
        market_code: u16,
        custom_decoder: Option<CustomDecoder>,
    ) -> Self {
        let (sender, receiver) = sync_channel(READER_CHANNEL_CAPACITY);
        thread::Builder::new()
            .name(format!("feed-{}", config.symbol.ticker.to_lowercase()))
            .spawn(move || {
                read_files(
                    sender,
                    data_directory,
                    config,
                    start_utc,
                    end_utc,
                    market_hours,
                    market_code,
                    custom_decoder,
                );
            })
            .expect("spawn feed reader thread");
        FileDataSource { receiver }
    }
}

impl DataSource for FileDataSource {
    fn next(&mut self) -> Result<SourcePoll, EngineError> {
        match self.receiver.recv() {
            Ok(Ok(data)) => Ok(SourcePoll::Data(data)),
            Ok(Err(e)) => Err(e),
            // Reader thread finished and dropped its sender.
            Err(_) => Ok(SourcePoll::End),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn read_files(
    sender: SyncSender<Result<BaseDataEnum, EngineError>>,
    data_directory: PathBuf,
    config: SubscriptionDataConfig,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
    market_hours: Arc<MarketHours>,
    market_code: u16,
    custom_decoder: Option<CustomDecoder>,
) {
    let send_batch = |batch: Vec<BaseDataEnum>| -> bool {
        for item in batch {
            if item.end_time() < start_utc {
                continue;
            }
            if item.end_time() > end_utc {
                return false;
            }
            if sender.send(Ok(item)).is_err() {
                return false;
            }
        }
        true
    };

    if config.resolution.is_single_file() || config.data_type == BaseDataType::Collections {
        let path = single_file_zip_path(&data_directory, &config);
        if !path.exists() {
            warn!("{}: no data file at {}", config, path.display());
            return;
        }
        let decoded = read_zip_entry(&path, None).and_then(|bytes| match config.data_type {
            BaseDataType::Collections => decode_universe_csv(&config, market_code, &bytes),
            BaseDataType::Custom => decode_custom_lines(&config, &custom_decoder, &bytes),
            _ => decode_daily_hour_csv(&config, &bytes),
        });
        match decoded {
            Ok(batch) => {
                send_batch(batch);
            }
            Err(e) => {
                let _ = sender.send(Err(e));
            }
        }
        return;
    }

    // Per-day archives: walk the exchange calendar so closed days cost
    // nothing, reading lazily against the channel's backpressure.
    let start_date = start_utc.with_timezone(&config.data_time_zone).date_naive();
    let end_date = end_utc.with_timezone(&config.data_time_zone).date_naive();
    for date in market_hours.trading_days(start_date, end_date) {
        let path = day_zip_path(&data_directory, &config, date);
        if !path.exists() {
            continue;
        }
        let decoded = read_zip_entry(&path, None).and_then(|bytes| match config.data_type {
            BaseDataType::Ticks => decode_tick_csv(&config, date, &bytes),
            BaseDataType::QuoteBars => decode_quote_intraday_csv(&config, date, &bytes),
            _ => decode_intraday_csv(&config, date, &bytes),
        });
        match decoded {
            Ok(batch) => {
                if !send_batch(batch) {
                    return;
                }
            }
            Err(e) => {
                // One bad day file is a recoverable data error, the consumer
                // decides when repeated failures deactivate the subscription.
                if sender.send(Err(e)).is_err() {
                    return;
                }
            }
        }
    }
}

fn decode_custom_lines(
    config: &SubscriptionDataConfig,
    decoder: &Option<CustomDecoder>,
    bytes: &[u8],
) -> Result<Vec<BaseDataEnum>, EngineError> {
    let decoder = decoder.as_ref().ok_or_else(|| {
        EngineError::Data(format!("{}: no decoder registered for custom data", config))
    })?;
    let mut items = Vec::new();
    for line in std::str::from_utf8(bytes)
        .unwrap_or("")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
    {
        match decoder(&config.symbol, line) {
            Ok(data) => items.push(BaseDataEnum::Custom(data)),
            Err(e) => warn!("{}: skipping corrupt custom row '{}': {}", config, line, e),
        }
    }
    items.sort_by_key(|i| i.end_time());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::codecs::{encode_daily_hour_csv, encode_intraday_csv};
    use crate::market_data::compression::write_zip_file;
    use crate::standardized_types::base_data::trade_bar::TradeBar;
    use crate::standardized_types::enums::SecurityType;
    use crate::standardized_types::market_hours::MarketHoursDatabase;
    use crate::standardized_types::resolution::Resolution;
    use crate::standardized_types::symbols::{SecurityIdentifier, Symbol};
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::New_York;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn equity_config(resolution: Resolution) -> SubscriptionDataConfig {
        SubscriptionDataConfig::new(
            Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string()),
            resolution,
            BaseDataType::TradeBars,
            "usa".to_string(),
            New_York,
            New_York,
        )
    }

    fn hours() -> Arc<MarketHours> {
        MarketHoursDatabase::new()
            .get("usa", SecurityType::Equity, None)
            .unwrap()
    }

    fn drain(source: &mut FileDataSource) -> Vec<BaseDataEnum> {
        let mut out = Vec::new();
        loop {
            match source.next().unwrap() {
                SourcePoll::Data(d) => out.push(d),
                SourcePoll::End => break,
                SourcePoll::NotReady => panic!("file source is never NotReady"),
            }
        }
        out
    }

    #[test]
    fn reads_daily_file_in_order() {
        let dir = tempdir().unwrap();
        let config = equity_config(Resolution::Daily);
        let mut bars = Vec::new();
        for day in [4, 5, 6] {
            let time = New_York.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap().to_utc();
            bars.push(TradeBar::new(
                config.symbol.clone(),
                dec!(150), dec!(151), dec!(149), dec!(150.5), dec!(1000),
                time,
                Resolution::Daily,
            ));
        }
        let csv = encode_daily_hour_csv(&config, &bars);
        write_zip_file(
            &single_file_zip_path(dir.path(), &config),
            &[("aapl.csv".to_string(), csv)],
        )
        .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let mut source =
            FileDataSource::new(dir.path().to_path_buf(), config, start, end, hours(), 1, None);
        let items = drain(&mut source);
        assert_eq!(items.len(), 3);
        assert!(items.windows(2).all(|w| w[0].end_time() <= w[1].end_time()));
    }

    #[test]
    fn positions_at_start_and_stops_at_end() {
        let dir = tempdir().unwrap();
        let config = equity_config(Resolution::Daily);
        let mut bars = Vec::new();
        for day in 4..=8 {
            let time = New_York.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap().to_utc();
            bars.push(TradeBar::new(
                config.symbol.clone(),
                dec!(150), dec!(151), dec!(149), dec!(150.5), dec!(1000),
                time,
                Resolution::Daily,
            ));
        }
        let csv = encode_daily_hour_csv(&config, &bars);
        write_zip_file(
            &single_file_zip_path(dir.path(), &config),
            &[("aapl.csv".to_string(), csv)],
        )
        .unwrap();

        // Bars become known at local midnight + 1 day. Clamp to the middle.
        let start = New_York.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap().to_utc();
        let end = New_York.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap().to_utc();
        let mut source =
            FileDataSource::new(dir.path().to_path_buf(), config, start, end, hours(), 1, None);
        let items = drain(&mut source);
        // End times Mar 6, 7 and 8 survive the clamp, Mar 5 and 9 do not.
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.end_time() >= start && i.end_time() <= end));
    }

    #[test]
    fn reads_per_day_minute_files_across_days() {
        let dir = tempdir().unwrap();
        let config = equity_config(Resolution::Minute);
        for (day, close) in [(4, dec!(150.5)), (5, dec!(151.5))] {
            let time = New_York.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap().to_utc();
            let bar = TradeBar::new(
                config.symbol.clone(),
                dec!(150), dec!(152), dec!(149), close, dec!(1000),
                time,
                Resolution::Minute,
            );
            let csv = encode_intraday_csv(&config, &[bar]);
            write_zip_file(
                &day_zip_path(dir.path(), &config, NaiveDate::from_ymd_opt(2024, 3, day as u32).unwrap()),
                &[("aapl.csv".to_string(), csv)],
            )
            .unwrap();
        }

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let mut source =
            FileDataSource::new(dir.path().to_path_buf(), config, start, end, hours(), 1, None);
        let items = drain(&mut source);
        assert_eq!(items.len(), 2);
        match (&items[0], &items[1]) {
            (BaseDataEnum::TradeBar(a), BaseDataEnum::TradeBar(b)) => {
                assert_eq!(a.close, dec!(150.5));
                assert_eq!(b.close, dec!(151.5));
            }
            _ => panic!("Expected trade bars"),
        }
    }

    #[test]
    fn missing_files_yield_empty_stream() {
        let dir = tempdir().unwrap();
        let config = equity_config(Resolution::Daily);
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let mut source =
            FileDataSource::new(dir.path().to_path_buf(), config, start, end, hours(), 1, None);
        assert!(drain(&mut source).is_empty());
    }

    #[test]
    fn live_channel_reports_not_ready() {
        let (sender, mut source) = live_channel(8);
        assert!(matches!(source.next().unwrap(), SourcePoll::NotReady));
        let time = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let symbol = Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string());
        sender
            .send(BaseDataEnum::Tick(
                crate::standardized_types::base_data::tick::Tick::new(
                    symbol, dec!(150), dec!(1), time,
                ),
            ))
            .unwrap();
        assert!(matches!(source.next().unwrap(), SourcePoll::Data(_)));
        drop(sender);
        assert!(matches!(source.next().unwrap(), SourcePoll::End));
    }
}
