pub mod converters;
pub mod decimal_calculators;
