use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use log::info;
use qf_standard_lib::app::settings::EngineSettings;
use qf_standard_lib::errors::EngineError;
use qf_standard_lib::market_data::codecs::encode_intraday_csv;
use qf_standard_lib::market_data::compression::write_zip_file;
use qf_standard_lib::market_data::file_paths::day_zip_path;
use qf_standard_lib::standardized_types::base_data::base_data_type::BaseDataType;
use qf_standard_lib::standardized_types::base_data::trade_bar::TradeBar;
use qf_standard_lib::standardized_types::enums::StrategyMode;
use qf_standard_lib::standardized_types::orders::OrderEvent;
use qf_standard_lib::standardized_types::resolution::Resolution;
use qf_standard_lib::standardized_types::rolling_window::RollingWindow;
use qf_standard_lib::standardized_types::subscriptions::SubscriptionDataConfig;
use qf_standard_lib::standardized_types::symbols::{SecurityIdentifier, Symbol};
use qf_standard_lib::standardized_types::time_slices::TimeSlice;
use qf_standard_lib::strategies::algorithm::{Algorithm, StrategyApi};
use qf_standard_lib::strategies::handlers::results_handler::LogSink;
use qf_standard_lib::strategies::handlers::timed_events_handler::{DateRule, TimeRule, TimedEvent};
use qf_standard_lib::strategies::historical_engine::HistoricalEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const TICKER: &str = "AAPL";
const SMA_PERIOD: usize = 10;

/// Buys when price closes above its moving average, flattens fifteen minutes
/// before every close through a scheduled event.
struct SmaCrossStrategy {
    symbol: Symbol,
    closes: RollingWindow<Decimal>,
    quantity: Decimal,
}

impl SmaCrossStrategy {
    fn new(symbol: Symbol) -> Self {
        SmaCrossStrategy {
            symbol,
            closes: RollingWindow::new(SMA_PERIOD),
            quantity: dec!(50),
        }
    }

    fn average_close(&self) -> Option<Decimal> {
        if !self.closes.is_full() {
            return None;
        }
        let sum: Decimal = self.closes.iter().sum();
        Some(sum / Decimal::from(self.closes.len() as u64))
    }
}

impl Algorithm for SmaCrossStrategy {
    fn initialize(&mut self, api: &mut StrategyApi) -> Result<(), EngineError> {
        api.add_equity(TICKER, Resolution::Minute);
        api.schedule_event(TimedEvent::new(
            "flatten",
            DateRule::EveryTradingDay(self.symbol.clone()),
            TimeRule::BeforeMarketClose(self.symbol.clone(), 15),
        ));
        Ok(())
    }

    fn on_data(&mut self, slice: &TimeSlice, api: &mut StrategyApi) -> Result<(), EngineError> {
        let Some(bar) = slice.slice.trade_bars.get(&self.symbol) else {
            return Ok(());
        };
        self.closes.add(bar.close);
        let Some(average) = self.average_close() else {
            return Ok(());
        };
        api.plot("Indicators", "SMA", average);

        let held = api.quantity(&self.symbol);
        if bar.close > average && held == dec!(0) && api.open_orders().is_empty() {
            info!(
                "{}: close {} above average {}, going long",
                slice.utc_time, bar.close, average
            );
            api.market_order(self.symbol.clone(), self.quantity);
        }
        Ok(())
    }

    fn on_scheduled_event(
        &mut self,
        name: &str,
        _fire_time: chrono::DateTime<Utc>,
        api: &mut StrategyApi,
    ) -> Result<(), EngineError> {
        if name == "flatten" {
            let held = api.quantity(&self.symbol);
            if held != dec!(0) {
                info!("{}: flattening {} into the close", api.time_utc(), held);
                api.market_order(self.symbol.clone(), -held);
            }
        }
        Ok(())
    }

    fn on_order_event(&mut self, event: &OrderEvent, _api: &mut StrategyApi) -> Result<(), EngineError> {
        info!("{}", event);
        Ok(())
    }
}

/// Writes three trading days of synthetic minute bars into the data
/// directory using the production codecs and path conventions.
fn generate_fixture_data(config: &SubscriptionDataConfig, data_directory: &std::path::Path) {
    for (day_index, day) in [4u32, 5, 6].iter().enumerate() {
        let date = NaiveDate::from_ymd_opt(2024, 3, *day).unwrap();
        let mut bars = Vec::new();
        for minute_of_session in 0..390i64 {
            let time = New_York
                .with_ymd_and_hms(2024, 3, *day, 9, 30, 0)
                .unwrap()
                .to_utc()
                + chrono::Duration::minutes(minute_of_session);
            // A deterministic drifting wave so crossings actually happen.
            let phase = (minute_of_session + day_index as i64 * 390) % 60;
            let wave = Decimal::from(if phase < 30 { phase } else { 60 - phase }) * dec!(0.05);
            let drift = Decimal::from(day_index as i64) * dec!(0.40);
            let open = dec!(150) + wave + drift;
            let close = open + dec!(0.02);
            bars.push(TradeBar::new(
                config.symbol.clone(),
                open,
                close + dec!(0.03),
                open - dec!(0.03),
                close,
                dec!(10_000),
                time,
                Resolution::Minute,
            ));
        }
        let csv = encode_intraday_csv(config, &bars);
        write_zip_file(
            &day_zip_path(data_directory, config, date),
            &[(format!("{}.csv", TICKER.to_lowercase()), csv)],
        )
        .expect("write fixture data");
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let data_directory = tempfile::tempdir().expect("create data directory");
    let symbol = Symbol::new(SecurityIdentifier::generate_equity(TICKER, 1), TICKER.to_string());
    let config = SubscriptionDataConfig::new(
        symbol.clone(),
        Resolution::Minute,
        BaseDataType::TradeBars,
        "usa".to_string(),
        New_York,
        New_York,
    );
    generate_fixture_data(&config, data_directory.path());

    let settings = EngineSettings::backtest_defaults(data_directory.path().to_path_buf());
    let engine = HistoricalEngine::new(
        "sma-cross-demo",
        StrategyMode::Backtest,
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap(),
        dec!(100_000),
        settings,
        Box::new(LogSink),
    );

    let mut strategy = SmaCrossStrategy::new(symbol);
    let exit = engine.run(&mut strategy).await;
    info!("Backtest finished with exit code {}", exit.code());
    std::process::exit(exit.code());
}
