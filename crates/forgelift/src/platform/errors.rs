use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors raised by the platform API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status, with the raw response body.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure (connection, timeout, DNS).
    #[error(transparent)]
    Transport(#[from] HttpError),

    /// The platform reported an exhausted quota.
    #[error("rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// One or more GraphQL errors in an otherwise successful response.
    #[error("GraphQL error: {message}")]
    Graph { message: String },

    /// The response could not be interpreted.
    #[error("unexpected response: {message}")]
    Decode { message: String },
}

impl ApiError {
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether the error is worth retrying through the transient-HTTP policy.
    ///
    /// Server errors, 429s, and transport failures qualify; everything else
    /// (client errors, GraphQL rejections, decode failures) does not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Transport(_) => true,
            Self::RateLimited { .. } => true,
            Self::Graph { .. } | Self::Decode { .. } => false,
        }
    }
}

/// Result type for platform API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
