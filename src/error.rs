//! Error types shared by the sampler core, the telemetry sinks and the service layer.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A caller supplied a value outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required capability could not be resolved.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// A telemetry sink rejected or could not accept a record.
    #[error("telemetry sink failure: {0}")]
    Telemetry(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Short, stable name of the variant, used as the exception type in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::DependencyUnavailable(_) => "DependencyUnavailable",
            Self::Telemetry(_) => "Telemetry",
            Self::Redis(_) => "Redis",
            Self::Serialization(_) => "Serialization",
            Self::Io(_) => "Io",
            Self::Config(_) => "Config",
            Self::Internal(_) => "Internal",
        }
    }
}
