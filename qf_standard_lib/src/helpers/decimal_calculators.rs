use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Rounds a price to the nearest multiple of the instrument's tick size.
pub fn round_to_tick_size(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= dec!(0) {
        return value;
    }
    (value / tick_size).round() * tick_size
}

/// Rounds to a fixed number of decimal places, away from zero on ties.
pub fn round_to_decimals(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Weighted average of an existing (quantity, price) lot with an additional
/// lot, used for average cost updates on fills.
pub fn weighted_average_price(
    existing_quantity: Decimal,
    existing_price: Decimal,
    added_quantity: Decimal,
    added_price: Decimal,
) -> Decimal {
    let total = existing_quantity + added_quantity;
    if total == dec!(0) {
        return dec!(0);
    }
    (existing_quantity * existing_price + added_quantity * added_price) / total
}
