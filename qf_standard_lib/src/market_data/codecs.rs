use crate::errors::EngineError;
use crate::helpers::converters::time_convert_local_naive_to_utc;
use crate::standardized_types::base_data::base_data_enum::{BaseDataCollection, BaseDataEnum};
use crate::standardized_types::base_data::custom::CustomData;
use crate::standardized_types::base_data::quote_bar::{Bar, QuoteBar};
use crate::standardized_types::base_data::tick::Tick;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::enums::SecurityType;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::resolution::Resolution;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use crate::standardized_types::symbols::{SecurityIdentifier, Symbol};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

/// Equity prices in daily and hourly files are integers in ten-thousandths.
/// Finer resolutions and other security types store plain decimals.
fn price_scale(config: &SubscriptionDataConfig) -> Decimal {
    if config.symbol.security_type() == SecurityType::Equity && config.resolution.is_single_file() {
        dec!(10000)
    } else {
        dec!(1)
    }
}

fn parse_price(field: &str, scale: Decimal) -> Result<Price, String> {
    let value = Decimal::from_str(field.trim()).map_err(|e| e.to_string())?;
    Ok(value / scale)
}

fn bar_open_from_day_ms(date: NaiveDate, ms_field: &str) -> Result<NaiveDateTime, String> {
    let ms: i64 = ms_field.trim().parse().map_err(|_| format!("Bad ms field: {}", ms_field))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap() + Duration::milliseconds(ms))
}

/// Decodes a daily or hourly trade bar archive entry. Rows are
/// `yyyyMMdd HH:mm,O,H,L,C,V`, timestamps are bar opens in the data zone.
pub fn decode_daily_hour_csv(
    config: &SubscriptionDataConfig,
    bytes: &[u8],
) -> Result<Vec<BaseDataEnum>, EngineError> {
    let scale = price_scale(config);
    let mut bars = Vec::new();
    for line in split_rows(bytes) {
        let fields: Vec<&str> = line.split(',').collect();
        let parsed = (|| -> Result<TradeBar, String> {
            if fields.len() < 6 {
                return Err(format!("Expected 6 fields, got {}", fields.len()));
            }
            let naive = NaiveDateTime::parse_from_str(fields[0].trim(), "%Y%m%d %H:%M")
                .map_err(|e| e.to_string())?;
            let time = time_convert_local_naive_to_utc(&config.data_time_zone, naive);
            Ok(TradeBar::new(
                config.symbol.clone(),
                parse_price(fields[1], scale)?,
                parse_price(fields[2], scale)?,
                parse_price(fields[3], scale)?,
                parse_price(fields[4], scale)?,
                Decimal::from_str(fields[5].trim()).map_err(|e| e.to_string())?,
                time,
                config.resolution,
            ))
        })();
        match parsed {
            Ok(bar) => bars.push(BaseDataEnum::TradeBar(bar)),
            Err(e) => warn!("{}: skipping corrupt row '{}': {}", config, line, e),
        }
    }
    bars.sort_by_key(|b| b.end_time());
    Ok(bars)
}

pub fn encode_daily_hour_csv(config: &SubscriptionDataConfig, bars: &[TradeBar]) -> Vec<u8> {
    let scale = price_scale(config);
    let mut out = String::new();
    for bar in bars {
        let local = bar.time.with_timezone(&config.data_time_zone).naive_local();
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            local.format("%Y%m%d %H:%M"),
            (bar.open * scale).normalize(),
            (bar.high * scale).normalize(),
            (bar.low * scale).normalize(),
            (bar.close * scale).normalize(),
            bar.volume.normalize(),
        ));
    }
    out.into_bytes()
}

/// Decodes a per-day trade bar archive (minute or second resolution). Rows
/// are `msSinceMidnight,O,H,L,C,V` against the trading date in the data zone.
pub fn decode_intraday_csv(
    config: &SubscriptionDataConfig,
    date: NaiveDate,
    bytes: &[u8],
) -> Result<Vec<BaseDataEnum>, EngineError> {
    let mut bars = Vec::new();
    for line in split_rows(bytes) {
        let fields: Vec<&str> = line.split(',').collect();
        let parsed = (|| -> Result<TradeBar, String> {
            if fields.len() < 6 {
                return Err(format!("Expected 6 fields, got {}", fields.len()));
            }
            let naive = bar_open_from_day_ms(date, fields[0])?;
            let time = time_convert_local_naive_to_utc(&config.data_time_zone, naive);
            Ok(TradeBar::new(
                config.symbol.clone(),
                parse_price(fields[1], dec!(1))?,
                parse_price(fields[2], dec!(1))?,
                parse_price(fields[3], dec!(1))?,
                parse_price(fields[4], dec!(1))?,
                Decimal::from_str(fields[5].trim()).map_err(|e| e.to_string())?,
                time,
                config.resolution,
            ))
        })();
        match parsed {
            Ok(bar) => bars.push(BaseDataEnum::TradeBar(bar)),
            Err(e) => warn!("{}: skipping corrupt row '{}': {}", config, line, e),
        }
    }
    bars.sort_by_key(|b| b.end_time());
    Ok(bars)
}

pub fn encode_intraday_csv(config: &SubscriptionDataConfig, bars: &[TradeBar]) -> Vec<u8> {
    let mut out = String::new();
    for bar in bars {
        let local = bar.time.with_timezone(&config.data_time_zone).naive_local();
        let midnight = local.date().and_hms_opt(0, 0, 0).unwrap();
        let ms = (local - midnight).num_milliseconds();
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            ms, bar.open, bar.high, bar.low, bar.close, bar.volume,
        ));
    }
    out.into_bytes()
}

/// Decodes a per-day quote bar archive. Rows carry both sides:
/// `ms,bidO,bidH,bidL,bidC,bidSize,askO,askH,askL,askC,askSize`.
pub fn decode_quote_intraday_csv(
    config: &SubscriptionDataConfig,
    date: NaiveDate,
    bytes: &[u8],
) -> Result<Vec<BaseDataEnum>, EngineError> {
    let mut bars = Vec::new();
    for line in split_rows(bytes) {
        let fields: Vec<&str> = line.split(',').collect();
        let parsed = (|| -> Result<QuoteBar, String> {
            if fields.len() < 11 {
                return Err(format!("Expected 11 fields, got {}", fields.len()));
            }
            let naive = bar_open_from_day_ms(date, fields[0])?;
            let time = time_convert_local_naive_to_utc(&config.data_time_zone, naive);
            let bid = Bar::new(
                parse_price(fields[1], dec!(1))?,
                parse_price(fields[2], dec!(1))?,
                parse_price(fields[3], dec!(1))?,
                parse_price(fields[4], dec!(1))?,
            );
            let ask = Bar::new(
                parse_price(fields[6], dec!(1))?,
                parse_price(fields[7], dec!(1))?,
                parse_price(fields[8], dec!(1))?,
                parse_price(fields[9], dec!(1))?,
            );
            let mut bar = QuoteBar::new(config.symbol.clone(), bid, ask, time, config.resolution);
            bar.bid_size = Decimal::from_str(fields[5].trim()).map_err(|e| e.to_string())?;
            bar.ask_size = Decimal::from_str(fields[10].trim()).map_err(|e| e.to_string())?;
            Ok(bar)
        })();
        match parsed {
            Ok(bar) => bars.push(BaseDataEnum::QuoteBar(bar)),
            Err(e) => warn!("{}: skipping corrupt row '{}': {}", config, line, e),
        }
    }
    bars.sort_by_key(|b| b.end_time());
    Ok(bars)
}

pub fn encode_quote_intraday_csv(config: &SubscriptionDataConfig, bars: &[QuoteBar]) -> Vec<u8> {
    let mut out = String::new();
    for bar in bars {
        let local = bar.time.with_timezone(&config.data_time_zone).naive_local();
        let midnight = local.date().and_hms_opt(0, 0, 0).unwrap();
        let ms = (local - midnight).num_milliseconds();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{}\n",
            ms,
            bar.bid.open,
            bar.bid.high,
            bar.bid.low,
            bar.bid.close,
            bar.bid_size,
            bar.ask.open,
            bar.ask.high,
            bar.ask.low,
            bar.ask.close,
            bar.ask_size,
        ));
    }
    out.into_bytes()
}

/// Decodes a per-day tick archive. Rows are
/// `msSinceMidnight,price,quantity,exchange,tradeCondition,suspicious`.
pub fn decode_tick_csv(
    config: &SubscriptionDataConfig,
    date: NaiveDate,
    bytes: &[u8],
) -> Result<Vec<BaseDataEnum>, EngineError> {
    let mut ticks = Vec::new();
    for line in split_rows(bytes) {
        let fields: Vec<&str> = line.split(',').collect();
        let parsed = (|| -> Result<Tick, String> {
            if fields.len() < 6 {
                return Err(format!("Expected 6 fields, got {}", fields.len()));
            }
            let naive = bar_open_from_day_ms(date, fields[0])?;
            let time = time_convert_local_naive_to_utc(&config.data_time_zone, naive);
            let mut tick = Tick::new(
                config.symbol.clone(),
                parse_price(fields[1], dec!(1))?,
                Decimal::from_str(fields[2].trim()).map_err(|e| e.to_string())?,
                time,
            );
            tick.exchange = fields[3].trim().to_string();
            tick.condition = fields[4].trim().to_string();
            tick.suspicious = fields[5].trim() == "1";
            Ok(tick)
        })();
        match parsed {
            Ok(tick) => ticks.push(BaseDataEnum::Tick(tick)),
            Err(e) => warn!("{}: skipping corrupt row '{}': {}", config, line, e),
        }
    }
    // Stable: same-ms ticks keep file order.
    ticks.sort_by_key(|t| t.end_time());
    Ok(ticks)
}

pub fn encode_tick_csv(config: &SubscriptionDataConfig, ticks: &[Tick]) -> Vec<u8> {
    let mut out = String::new();
    for tick in ticks {
        let local = tick.time.with_timezone(&config.data_time_zone).naive_local();
        let midnight = local.date().and_hms_opt(0, 0, 0).unwrap();
        let ms = (local - midnight).num_milliseconds();
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            ms,
            tick.price,
            tick.size,
            tick.exchange,
            tick.condition,
            if tick.suspicious { 1 } else { 0 },
        ));
    }
    out.into_bytes()
}

/// Decodes a universe archive: `yyyyMMdd HH:mm,ticker,price` rows, grouped by
/// timestamp into one `Collection` per instant. Candidate symbols are minted
/// as equities on the given market code.
pub fn decode_universe_csv(
    config: &SubscriptionDataConfig,
    market_code: u16,
    bytes: &[u8],
) -> Result<Vec<BaseDataEnum>, EngineError> {
    let mut grouped: Vec<(DateTime<Utc>, Vec<BaseDataEnum>)> = Vec::new();
    for line in split_rows(bytes) {
        let fields: Vec<&str> = line.split(',').collect();
        let parsed = (|| -> Result<(DateTime<Utc>, CustomData), String> {
            if fields.len() < 3 {
                return Err(format!("Expected 3 fields, got {}", fields.len()));
            }
            let naive = NaiveDateTime::parse_from_str(fields[0].trim(), "%Y%m%d %H:%M")
                .map_err(|e| e.to_string())?;
            let time = time_convert_local_naive_to_utc(&config.data_time_zone, naive);
            let ticker = fields[1].trim().to_uppercase();
            let symbol = Symbol::new(
                SecurityIdentifier::generate_equity(&ticker, market_code),
                ticker,
            );
            let price = parse_price(fields[2], dec!(1))?;
            Ok((
                time,
                CustomData {
                    symbol,
                    type_name: "universe".to_string(),
                    time,
                    end_time: time,
                    value: price,
                    payload: String::new(),
                },
            ))
        })();
        match parsed {
            Ok((time, entry)) => match grouped.last_mut() {
                Some((t, items)) if *t == time => items.push(BaseDataEnum::Custom(entry)),
                _ => grouped.push((time, vec![BaseDataEnum::Custom(entry)])),
            },
            Err(e) => warn!("{}: skipping corrupt row '{}': {}", config, line, e),
        }
    }
    grouped.sort_by_key(|(t, _)| *t);
    Ok(grouped
        .into_iter()
        .map(|(time, items)| {
            BaseDataEnum::Collection(BaseDataCollection {
                symbol: config.symbol.clone(),
                time,
                end_time: time,
                items,
            })
        })
        .collect())
}

fn split_rows(bytes: &[u8]) -> impl Iterator<Item = &str> {
    std::str::from_utf8(bytes)
        .unwrap_or("")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
}
