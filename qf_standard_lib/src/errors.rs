use thiserror::Error;

/// Error taxonomy for the engine core. Data and order errors are recovered
/// locally, everything else surfaces as an `AlgorithmStatus` change plus a
/// `HandledError` packet on the result channel.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum EngineError {
    /// Missing or unconvertible required configuration key, fatal during setup.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// The algorithm's `initialize` failed, fatal, maps to `AlgorithmStatus::DeployError`.
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Corrupt or unreadable subscription item, skipped and logged.
    #[error("Data Error: {0}")]
    Data(String),

    /// Invalid order parameters, insufficient buying power, symbol not tradeable.
    #[error("Order Error: {0}")]
    Order(String),

    /// An algorithm callback failed, the engine transitions to `RuntimeError`.
    #[error("Runtime Error: {0}")]
    Runtime(String),

    /// A live brokerage reported a failure.
    #[error("Broker Error: {0}")]
    Broker(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Data(e.to_string())
    }
}

/// Process exit codes handed to the launcher collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineExitCode {
    Ok = 0,
    InitializationError = 1,
    RuntimeError = 2,
    Aborted = 3,
}

impl EngineExitCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}
