use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The shape of the items a subscription yields. Auxiliary covers the corporate
/// event family, Collections is the universe-selection payload shape.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum BaseDataType {
    Ticks,
    TradeBars,
    QuoteBars,
    OptionContracts,
    Auxiliary,
    Custom,
    Collections,
}

impl FromStr for BaseDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ticks" => Ok(BaseDataType::Ticks),
            "tradebars" => Ok(BaseDataType::TradeBars),
            "quotebars" => Ok(BaseDataType::QuoteBars),
            "optioncontracts" => Ok(BaseDataType::OptionContracts),
            "auxiliary" => Ok(BaseDataType::Auxiliary),
            "custom" => Ok(BaseDataType::Custom),
            "collections" => Ok(BaseDataType::Collections),
            _ => Err(format!("Unknown BaseDataType: {}", s)),
        }
    }
}

impl fmt::Display for BaseDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseDataType::Ticks => write!(f, "Ticks"),
            BaseDataType::TradeBars => write!(f, "TradeBars"),
            BaseDataType::QuoteBars => write!(f, "QuoteBars"),
            BaseDataType::OptionContracts => write!(f, "OptionContracts"),
            BaseDataType::Auxiliary => write!(f, "Auxiliary"),
            BaseDataType::Custom => write!(f, "Custom"),
            BaseDataType::Collections => write!(f, "Collections"),
        }
    }
}
