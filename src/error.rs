use std::fmt;

/// Main error type for the Kestrel discovery client
#[derive(Debug)]
pub enum KestrelError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Registry communication errors (register, renew, fetch)
    Registry(String),

    /// Transport layer errors
    Transport(String),

    /// Background scheduling errors
    Scheduler(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),
}

impl fmt::Display for KestrelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KestrelError::Config(msg) => write!(f, "Configuration error: {}", msg),
            KestrelError::Registry(msg) => write!(f, "Registry error: {}", msg),
            KestrelError::Transport(msg) => write!(f, "Transport error: {}", msg),
            KestrelError::Scheduler(msg) => write!(f, "Scheduler error: {}", msg),
            KestrelError::Io(err) => write!(f, "I/O error: {}", err),
            KestrelError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for KestrelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KestrelError::Io(err) => Some(err),
            KestrelError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, KestrelError>;

// Conversions from common error types
impl From<std::io::Error> for KestrelError {
    fn from(err: std::io::Error) -> Self {
        KestrelError::Io(err)
    }
}

impl From<serde_json::Error> for KestrelError {
    fn from(err: serde_json::Error) -> Self {
        KestrelError::Serialization(err)
    }
}

impl From<reqwest::Error> for KestrelError {
    fn from(err: reqwest::Error) -> Self {
        KestrelError::Registry(err.to_string())
    }
}
