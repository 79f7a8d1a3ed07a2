use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display;

/// The mode the engine is launched in. Live and LivePaperTrading share the
/// same wall-clock feed path, Backtest replays history on the simulated clock.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug, Display, Hash)]
pub enum StrategyMode {
    Backtest,
    Live,
    LivePaperTrading,
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, Display, Hash)]
pub enum SecurityType {
    Equity,
    Forex,
    Future,
    Option,
    Crypto,
    Custom,
}

impl SecurityType {
    /// Stable small-integer code used inside `SecurityIdentifier` encoding
    /// and in on-disk path conventions. Never reorder.
    pub fn code(&self) -> u8 {
        match self {
            SecurityType::Equity => 0,
            SecurityType::Forex => 1,
            SecurityType::Future => 2,
            SecurityType::Option => 3,
            SecurityType::Crypto => 4,
            SecurityType::Custom => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SecurityType::Equity),
            1 => Some(SecurityType::Forex),
            2 => Some(SecurityType::Future),
            3 => Some(SecurityType::Option),
            4 => Some(SecurityType::Crypto),
            5 => Some(SecurityType::Custom),
            _ => None,
        }
    }

    /// Lower-case directory segment used in data file paths.
    pub fn path_segment(&self) -> &'static str {
        match self {
            SecurityType::Equity => "equity",
            SecurityType::Forex => "forex",
            SecurityType::Future => "future",
            SecurityType::Option => "option",
            SecurityType::Crypto => "crypto",
            SecurityType::Custom => "custom",
        }
    }
}

impl FromStr for SecurityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equity" => Ok(SecurityType::Equity),
            "forex" => Ok(SecurityType::Forex),
            "future" => Ok(SecurityType::Future),
            "option" => Ok(SecurityType::Option),
            "crypto" => Ok(SecurityType::Crypto),
            "custom" => Ok(SecurityType::Custom),
            _ => Err(format!("Unknown SecurityType: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, Display, Hash)]
pub enum OptionRight {
    Call,
    Put,
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, Display, Hash)]
pub enum OptionStyle {
    American,
    European,
}

/// Reported to the outside world over the result channel whenever the
/// algorithm's lifecycle state changes.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug, Display)]
pub enum AlgorithmStatus {
    DeployError,
    InQueue,
    Running,
    Stopped,
    Liquidated,
    Deleted,
    Completed,
    RuntimeError,
    Invalid,
    LoggingIn,
    Initializing,
    History,
}
