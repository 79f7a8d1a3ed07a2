use chrono::Duration;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The period a single data point covers. `Tick` data carries no period, a
/// bar's `end_time - time` always equals its resolution's duration.
#[derive(Serialize, Deserialize, Clone, PartialOrd, Eq, Ord, PartialEq, Copy, Debug, Hash)]
pub enum Resolution {
    Tick,
    Second,
    Minute,
    Hour,
    Daily,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Minute
    }
}

impl Resolution {
    /// Duration of one bar at this resolution. Ticks return zero, this is
    /// used to derive bar close times from open times.
    pub fn as_duration(&self) -> Duration {
        match self {
            Resolution::Tick => Duration::zero(),
            Resolution::Second => Duration::seconds(1),
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
            Resolution::Daily => Duration::days(1),
        }
    }

    pub fn as_seconds(&self) -> i64 {
        self.as_duration().num_seconds()
    }

    /// Daily and hourly data live in one zip per symbol, finer resolutions
    /// are stored one zip per symbol per trading day.
    pub fn is_single_file(&self) -> bool {
        matches!(self, Resolution::Hour | Resolution::Daily)
    }

    /// Lower-case directory segment used in data file paths.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Resolution::Tick => "tick",
            Resolution::Second => "second",
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
            Resolution::Daily => "daily",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tick" => Ok(Resolution::Tick),
            "second" => Ok(Resolution::Second),
            "minute" => Ok(Resolution::Minute),
            "hour" => Ok(Resolution::Hour),
            "daily" => Ok(Resolution::Daily),
            _ => Err(format!("Unknown Resolution: {}", s)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Tick => write!(f, "Tick"),
            Resolution::Second => write!(f, "Second"),
            Resolution::Minute => write!(f, "Minute"),
            Resolution::Hour => write!(f, "Hour"),
            Resolution::Daily => write!(f, "Daily"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(Resolution::Tick.as_duration(), Duration::zero());
        assert_eq!(Resolution::Minute.as_seconds(), 60);
        assert_eq!(Resolution::Daily.as_seconds(), 86_400);
    }

    #[test]
    fn ordering_matches_granularity() {
        assert!(Resolution::Tick < Resolution::Second);
        assert!(Resolution::Minute < Resolution::Hour);
        assert!(Resolution::Hour < Resolution::Daily);
    }

    #[test]
    fn path_segments_round_trip() {
        for res in [
            Resolution::Tick,
            Resolution::Second,
            Resolution::Minute,
            Resolution::Hour,
            Resolution::Daily,
        ] {
            assert_eq!(res.path_segment().parse::<Resolution>().unwrap(), res);
        }
    }
}
