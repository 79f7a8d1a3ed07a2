pub mod algorithm;
pub mod consolidators;
pub mod handlers;
pub mod historical_engine;
pub mod ledgers;
pub mod universe;
