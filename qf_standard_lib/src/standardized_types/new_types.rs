use rust_decimal::Decimal;

pub type Price = Decimal;
pub type Volume = Decimal;
pub type CurrencyCode = String;
pub type TickerName = String;
pub type MarketName = String;
