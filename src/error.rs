use chrono::{DateTime, Utc};
use thiserror::Error;

pub use aws_sigv4::SigningError;

/// The proxy is wired to something it cannot handle. Never recovered from: the invocation is
/// aborted instead of forwarding an unsigned request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("unexpected origin type, expected 'custom', got '{0}'")]
    UnsupportedOrigin(&'static str),

    #[error("request has no origin descriptor")]
    MissingOrigin,

    #[error("expected exactly one record in the event, got {0}")]
    RecordCount(usize),

    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },
}

/// The credential chain could not produce usable credentials.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CredentialError {
    /// No source in the provider chain had credentials to offer.
    #[error("credentials not configured: {0}")]
    NotConfigured(String),

    #[error("credential provider failed: {0}")]
    Provider(String),

    #[error("credentials expired at {0}")]
    Expired(DateTime<Utc>),
}

/// Everything that aborts an invocation.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}
