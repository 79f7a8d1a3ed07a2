pub mod accounts;
pub mod base_data;
pub mod enums;
pub mod market_hours;
pub mod new_types;
pub mod orders;
pub mod positions;
pub mod resolution;
pub mod rolling_window;
pub mod securities;
pub mod subscriptions;
pub mod symbols;
pub mod time_slices;
