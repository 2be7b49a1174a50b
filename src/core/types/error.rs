//! Unified provider error handling
//!
//! Single error type for all providers. Every back-end failure is mapped
//! into [`ProviderError`], which carries the provider name and resolves to
//! an [`ErrorCode`] from the gateway taxonomy. The orchestrators key
//! retry and fallback decisions on the code, never on provider-specific
//! detail.
//!
//! | Code | Retryable |
//! |------|-----------|
//! | `RATE_LIMIT` | Yes |
//! | `TIMEOUT` | Yes |
//! | `UNAVAILABLE` | Yes |
//! | `UPSTREAM_5XX` | Yes |
//! | `SAFETY` | No |
//! | `CONTEXT_OVERFLOW` | No |
//! | `AUTH` | No |
//! | `UNKNOWN` | No |

use serde::{Deserialize, Serialize};

/// Error taxonomy shared across providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Rate limit exceeded
    RateLimit,
    /// Request deadline elapsed
    Timeout,
    /// Provider temporarily unavailable
    Unavailable,
    /// Upstream returned a 5xx status
    #[serde(rename = "UPSTREAM_5XX")]
    Upstream5xx,
    /// Content blocked by provider safety systems
    Safety,
    /// Input exceeds the model's context window
    ContextOverflow,
    /// Authentication or authorization failure
    Auth,
    /// Anything else
    Unknown,
}

impl ErrorCode {
    /// Whether errors with this code may be retried on a fallback model
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit | ErrorCode::Timeout | ErrorCode::Unavailable | ErrorCode::Upstream5xx
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Upstream5xx => "UPSTREAM_5XX",
            ErrorCode::Safety => "SAFETY",
            ErrorCode::ContextOverflow => "CONTEXT_OVERFLOW",
            ErrorCode::Auth => "AUTH",
            ErrorCode::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Unified provider error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limit exceeded for {provider}: {message}")]
    RateLimit {
        provider: String,
        message: String,
        /// Provider-suggested delay before retrying, in seconds
        retry_after: Option<u64>,
    },

    #[error("Timeout for {provider}: {message}")]
    Timeout { provider: String, message: String },

    #[error("Provider {provider} is unavailable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("Upstream error from {provider} (status {status}): {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Content blocked by {provider} safety systems: {reason}")]
    Safety {
        provider: String,
        reason: String,
        /// Policy categories that were violated, if reported
        categories: Vec<String>,
    },

    #[error("Context window exceeded for {provider}: max {max} tokens, got {actual}")]
    ContextOverflow {
        provider: String,
        max: u32,
        actual: u32,
    },

    #[error("Authentication failed for {provider}: {message}")]
    Auth { provider: String, message: String },

    #[error("Feature '{feature}' not supported by {provider}")]
    NotSupported { provider: String, feature: String },

    #[error("{provider} error: {message}")]
    Unknown { provider: String, message: String },
}

impl ProviderError {
    /// Create rate limit error
    pub fn rate_limit(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            provider: provider.into(),
            message: match retry_after {
                Some(seconds) => format!("retry after {} seconds", seconds),
                None => "rate limit exceeded".to_string(),
            },
            retry_after,
        }
    }

    /// Create timeout error
    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create unavailable error
    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create upstream 5xx error
    pub fn upstream(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create safety error
    pub fn safety(
        provider: impl Into<String>,
        reason: impl Into<String>,
        categories: Vec<String>,
    ) -> Self {
        Self::Safety {
            provider: provider.into(),
            reason: reason.into(),
            categories,
        }
    }

    /// Create context overflow error
    pub fn context_overflow(provider: impl Into<String>, max: u32, actual: u32) -> Self {
        Self::ContextOverflow {
            provider: provider.into(),
            max,
            actual,
        }
    }

    /// Create authentication error
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create not supported error
    pub fn not_supported(provider: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::NotSupported {
            provider: provider.into(),
            feature: feature.into(),
        }
    }

    /// Create generic error
    pub fn unknown(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unknown {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Get the provider name that caused this error
    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimit { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::Upstream { provider, .. }
            | Self::Safety { provider, .. }
            | Self::ContextOverflow { provider, .. }
            | Self::Auth { provider, .. }
            | Self::NotSupported { provider, .. }
            | Self::Unknown { provider, .. } => provider,
        }
    }

    /// Resolve this error to its taxonomy code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RateLimit { .. } => ErrorCode::RateLimit,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Unavailable { .. } => ErrorCode::Unavailable,
            Self::Upstream { status, .. } if *status >= 500 => ErrorCode::Upstream5xx,
            Self::Upstream { .. } => ErrorCode::Unknown,
            Self::Safety { .. } => ErrorCode::Safety,
            Self::ContextOverflow { .. } => ErrorCode::ContextOverflow,
            Self::Auth { .. } => ErrorCode::Auth,
            Self::NotSupported { .. } | Self::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Check if this error is retryable on a fallback model
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Get suggested retry delay in seconds
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => retry_after.or(Some(60)),
            Self::Timeout { .. } => Some(1),
            Self::Unavailable { .. } => Some(5),
            Self::Upstream { status, .. } if *status >= 500 => Some(3),
            _ => None,
        }
    }

    /// Get HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RateLimit { .. } => 429,
            Self::Timeout { .. } => 408,
            Self::Unavailable { .. } => 503,
            Self::Upstream { status, .. } => *status,
            Self::Safety { .. } => 400,
            Self::ContextOverflow { .. } => 413,
            Self::Auth { .. } => 401,
            Self::NotSupported { .. } => 501,
            Self::Unknown { .. } => 500,
        }
    }
}
