use crate::standardized_types::base_data::base_data_type::BaseDataType;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// On-disk layout: `{security-type}/{market}/{resolution}/...` under the
/// configured data directory. Daily and hourly archives hold a symbol's whole
/// history, finer resolutions get one archive per symbol per trading day.
pub fn single_file_zip_path(data_directory: &Path, config: &SubscriptionDataConfig) -> PathBuf {
    data_directory
        .join(config.symbol.security_type().path_segment())
        .join(config.market.to_lowercase())
        .join(config.resolution.path_segment())
        .join(format!(
            "{}{}.zip",
            config.symbol.ticker.to_lowercase(),
            suffix_for(config.data_type)
        ))
}

pub fn day_zip_path(
    data_directory: &Path,
    config: &SubscriptionDataConfig,
    date: NaiveDate,
) -> PathBuf {
    data_directory
        .join(config.symbol.security_type().path_segment())
        .join(config.market.to_lowercase())
        .join(config.resolution.path_segment())
        .join(config.symbol.ticker.to_lowercase())
        .join(format!(
            "{}{}.zip",
            date.format("%Y%m%d"),
            suffix_for(config.data_type)
        ))
}

pub fn map_file_path(data_directory: &Path, market: &str, permtick: &str) -> PathBuf {
    data_directory
        .join("equity")
        .join(market.to_lowercase())
        .join("map_files")
        .join(format!("{}.csv", permtick.to_lowercase()))
}

fn suffix_for(data_type: BaseDataType) -> &'static str {
    match data_type {
        BaseDataType::QuoteBars => "_quote",
        BaseDataType::Ticks => "_trade",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::resolution::Resolution;
    use crate::standardized_types::symbols::{SecurityIdentifier, Symbol};
    use chrono_tz::America::New_York;

    fn config(resolution: Resolution, data_type: BaseDataType) -> SubscriptionDataConfig {
        SubscriptionDataConfig::new(
            Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string()),
            resolution,
            data_type,
            "usa".to_string(),
            New_York,
            New_York,
        )
    }

    #[test]
    fn daily_paths() {
        let path = single_file_zip_path(
            Path::new("/data"),
            &config(Resolution::Daily, BaseDataType::TradeBars),
        );
        assert_eq!(path, PathBuf::from("/data/equity/usa/daily/aapl.zip"));
    }

    #[test]
    fn minute_paths_split_by_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let path = day_zip_path(
            Path::new("/data"),
            &config(Resolution::Minute, BaseDataType::QuoteBars),
            date,
        );
        assert_eq!(
            path,
            PathBuf::from("/data/equity/usa/minute/aapl/20240304_quote.zip")
        );
    }

    #[test]
    fn map_file_paths() {
        assert_eq!(
            map_file_path(Path::new("/data"), "USA", "GOOCV"),
            PathBuf::from("/data/equity/usa/map_files/goocv.csv")
        );
    }
}
