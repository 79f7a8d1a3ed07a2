pub mod backtest_matching_engine;
pub mod brokerage_models;
pub mod fill_models;
pub mod live_brokerage;
pub mod transaction_handler;
