use thiserror::Error as ThisError;

/// Errors raised by the token and transaction pipeline.
#[derive(Debug, ThisError)]
pub enum Error {
    // fatal for the whole cycle
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("account store error: {0}")]
    Store(String),

    // per account
    #[error("token cache error: {0}")]
    Cache(String),

    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("upstream responded with {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("timed out waiting for refresh lock on '{0}'")]
    LockTimeout(String),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Short label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Store(_) => "store",
            Error::Cache(_) => "cache",
            Error::Auth(_) => "auth",
            Error::Transport(_) => "transport",
            Error::Decode(_) => "decode",
            Error::Upstream { .. } => "upstream",
            Error::LockTimeout(_) => "lock_timeout",
            Error::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Decode(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Cache(e.to_string())
    }
}
