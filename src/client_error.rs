//! The unified error taxonomy surfaced by every public operation.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the client, the resolver, and every adapter.
///
/// Every variant implements [`std::error::Error::source`] so callers and logs retain the full
/// cause chain down to the underlying transport or driver error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The resolver returned 404 for a path. Never counted as a circuit-breaker failure.
    #[error("moniker not found: {path}")]
    NotFound {
        /// Normalized path that was not found.
        path: String,
    },

    /// The resolver returned 403 for `/fetch/{path}`.
    #[error("access denied for {path}: {detail}")]
    AccessDenied {
        /// Normalized path access was denied for.
        path: String,
        /// `detail` field from the resolver's response body.
        detail: String,
    },

    /// Any other non-2xx status returned during resolution.
    #[error("resolution failed for {path} with status {status}: {detail}")]
    ResolutionError {
        /// Normalized path that failed to resolve.
        path: String,
        /// HTTP status code returned by the resolver.
        status: u16,
        /// Response body or derived detail message.
        detail: String,
    },

    /// A failure during adapter fetch after a successful resolution.
    #[error("fetch failed for {path}: {source}")]
    FetchError {
        /// Normalized path being fetched.
        path: String,
        /// Underlying adapter failure.
        #[source]
        source: Box<ClientError>,
    },

    /// A bounded wait (transport timeout or adapter retry-exhausted) elapsed.
    #[error("operation timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// Time actually waited.
        elapsed: Duration,
        /// Configured limit that was exceeded.
        limit: Duration,
    },

    /// A transport-level connection failure, including circuit-breaker fail-fast.
    #[error("connection refused: {message}")]
    ConnectionRefused {
        /// Human-readable detail, e.g. remaining breaker cool-down.
        message: String,
    },

    /// Credential rejection by an adapter (e.g. a mapped `ORA-01017`).
    #[error("authentication failed: {message}")]
    AuthenticationFailure {
        /// Human-readable detail from the underlying driver or provider.
        message: String,
    },

    /// All retry attempts failed; carries the last underlying error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made, including the first.
        attempts: usize,
        /// Last underlying error observed.
        #[source]
        source: Box<ClientError>,
    },

    /// A required configuration option was missing or invalid.
    #[error("configuration error: {message}")]
    ConfigurationError {
        /// Human-readable detail.
        message: String,
    },

    /// Response-schema validation failed.
    #[error("validation failed: {message}")]
    ValidationError {
        /// Human-readable detail.
        message: String,
    },

    /// Transport-level failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response body failed to decode as the expected JSON shape.
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A configured URL failed to parse.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// True if this is a [`ClientError::NotFound`]; used by the resolver client to decide
    /// whether to report a circuit-breaker failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// True for errors the retry engine classifies as retryable: network/timeout failures and
    /// transport statuses in the configured retryable set. Terminal errors (NotFound,
    /// AccessDenied, AuthenticationFailure, ConfigurationError, ValidationError) are not retried.
    pub fn is_retryable(&self, retryable_status_codes: &[u16]) -> bool {
        match self {
            ClientError::Timeout { .. } | ClientError::ConnectionRefused { .. } => true,
            ClientError::ResolutionError { status, .. } => {
                retryable_status_codes.contains(status)
            }
            ClientError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ClientError::ConfigurationError { message: message.into() }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ClientError::ValidationError { message: message.into() }
    }

    pub(crate) fn auth_failure(message: impl Into<String>) -> Self {
        ClientError::AuthenticationFailure { message: message.into() }
    }

    pub(crate) fn connection_refused(message: impl Into<String>) -> Self {
        ClientError::ConnectionRefused { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_retryable() {
        let err = ClientError::NotFound { path: "a/b".into() };
        assert!(err.is_not_found());
        assert!(!err.is_retryable(&[429, 502, 503, 504]));
    }

    #[test]
    fn resolution_error_retryable_only_for_configured_status() {
        let retryable = ClientError::ResolutionError {
            path: "a/b".into(),
            status: 503,
            detail: "bad gateway".into(),
        };
        assert!(retryable.is_retryable(&[429, 502, 503, 504]));

        let terminal = ClientError::ResolutionError {
            path: "a/b".into(),
            status: 500,
            detail: "internal error".into(),
        };
        assert!(!terminal.is_retryable(&[429, 502, 503, 504]));
    }

    #[test]
    fn fetch_error_chains_source() {
        use std::error::Error;
        let inner = ClientError::ConnectionRefused { message: "no listener".into() };
        let wrapped = ClientError::FetchError { path: "a/b".into(), source: Box::new(inner) };
        assert!(wrapped.source().is_some());
    }
}
