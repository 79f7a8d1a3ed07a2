pub mod data_feed;
pub mod market_handler;
pub mod results_handler;
pub mod subscription_handler;
pub mod timed_events_handler;
