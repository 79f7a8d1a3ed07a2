use crate::errors::EngineError;
use serde_derive::Deserialize;
use std::path::{Path, PathBuf};

fn default_max_history_minutes() -> u32 {
    43_200
}

fn default_notification_rate_limit() -> u32 {
    30
}

fn default_setup_timeout_seconds() -> u64 {
    300
}

fn default_backtest_callback_timeout_seconds() -> u64 {
    300
}

fn default_live_callback_timeout_seconds() -> u64 {
    10
}

fn default_data_failure_limit() -> u8 {
    3
}

fn default_scheduler_failure_limit() -> u8 {
    5
}

fn default_max_runtime_hours() -> u64 {
    12
}

/// Configuration the engine core consumes. Collaborator handlers are
/// referenced by type name only, resolution happens in the launcher.
/// Missing or unconvertible required keys are fatal, the engine refuses to
/// start.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineSettings {
    #[serde(rename = "data-directory")]
    pub data_directory: PathBuf,

    #[serde(rename = "job-queue-handler")]
    pub job_queue_handler: String,

    #[serde(rename = "api-handler")]
    pub api_handler: String,

    #[serde(rename = "messaging-handler")]
    pub messaging_handler: String,

    #[serde(rename = "max-history-minutes", default = "default_max_history_minutes")]
    pub max_history_minutes: u32,

    /// Debug/log notifications per hour before the result channel throttles.
    #[serde(
        rename = "notification-rate-limit",
        default = "default_notification_rate_limit"
    )]
    pub notification_rate_limit: u32,

    #[serde(rename = "setup-timeout-seconds", default = "default_setup_timeout_seconds")]
    pub setup_timeout_seconds: u64,

    #[serde(
        rename = "backtest-callback-timeout-seconds",
        default = "default_backtest_callback_timeout_seconds"
    )]
    pub backtest_callback_timeout_seconds: u64,

    #[serde(
        rename = "live-callback-timeout-seconds",
        default = "default_live_callback_timeout_seconds"
    )]
    pub live_callback_timeout_seconds: u64,

    /// Consecutive read failures before a subscription is deactivated.
    #[serde(rename = "data-failure-limit", default = "default_data_failure_limit")]
    pub data_failure_limit: u8,

    /// Consecutive scheduled-event failures before the algorithm is aborted.
    #[serde(
        rename = "scheduler-failure-limit",
        default = "default_scheduler_failure_limit"
    )]
    pub scheduler_failure_limit: u8,

    #[serde(rename = "max-runtime-hours", default = "default_max_runtime_hours")]
    pub max_runtime_hours: u64,
}

impl EngineSettings {
    pub fn from_toml_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        toml::from_str(content).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Defaults suitable for tests and the bundled demo strategy.
    pub fn backtest_defaults(data_directory: PathBuf) -> Self {
        EngineSettings {
            data_directory,
            job_queue_handler: "NullJobQueueHandler".to_string(),
            api_handler: "NullApiHandler".to_string(),
            messaging_handler: "LogMessagingHandler".to_string(),
            max_history_minutes: default_max_history_minutes(),
            notification_rate_limit: default_notification_rate_limit(),
            setup_timeout_seconds: default_setup_timeout_seconds(),
            backtest_callback_timeout_seconds: default_backtest_callback_timeout_seconds(),
            live_callback_timeout_seconds: default_live_callback_timeout_seconds(),
            data_failure_limit: default_data_failure_limit(),
            scheduler_failure_limit: default_scheduler_failure_limit(),
            max_runtime_hours: default_max_runtime_hours(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_with_defaults() {
        let settings = EngineSettings::from_toml(
            r#"
            data-directory = "/data"
            job-queue-handler = "NullJobQueueHandler"
            api-handler = "NullApiHandler"
            messaging-handler = "LogMessagingHandler"
            "#,
        )
        .unwrap();
        assert_eq!(settings.data_directory, PathBuf::from("/data"));
        assert_eq!(settings.notification_rate_limit, 30);
        assert_eq!(settings.data_failure_limit, 3);
        assert_eq!(settings.setup_timeout_seconds, 300);
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let result = EngineSettings::from_toml(r#"data-directory = "/data""#);
        match result {
            Err(EngineError::Configuration(_)) => {}
            other => panic!("Expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn unconvertible_key_is_fatal() {
        let result = EngineSettings::from_toml(
            r#"
            data-directory = "/data"
            job-queue-handler = "NullJobQueueHandler"
            api-handler = "NullApiHandler"
            messaging-handler = "LogMessagingHandler"
            notification-rate-limit = "lots"
            "#,
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
