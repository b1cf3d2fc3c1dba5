use std::time::Duration;

use reqwest::StatusCode;

/// Errors surfaced by the sign-in flow and the API client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The host refused to open the sign-in window.
    #[error("Popup window was blocked. Please allow popups for this site.")]
    PopupBlocked,

    /// The sign-in window was closed before it reported a result.
    #[error("Sign-in window was closed before authentication completed")]
    PopupClosed,

    /// No result arrived from the sign-in window in time.
    #[error("Timed out after {0:?} waiting for the sign-in window")]
    PopupTimeout(Duration),

    /// The identity provider reported an error to the callback page.
    #[error("{error}: {description}")]
    Provider { error: String, description: String },

    /// The backend rejected or failed the authorization-code exchange.
    #[error("Code exchange failed: {0}")]
    Exchange(#[source] Box<Error>),

    /// The access token could not be refreshed.
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    /// No response was received (connection failure or timeout).
    #[error("No response from {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A response arrived with a non-success status.
    #[error("{url} returned HTTP {status}: {detail}")]
    Status {
        url: String,
        status: StatusCode,
        detail: String,
    },

    /// A response body could not be decoded.
    #[error("Invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A request body could not be serialized.
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The embedding host could not supply a single sign-on token.
    #[error("SSO token unavailable: {0}")]
    Sso(String),

    /// Durable storage read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of the response that caused this error, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Exchange(inner) => inner.status(),
            _ => None,
        }
    }

    /// True when the request never produced a response: connect failures,
    /// dropped connections and timeouts.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn decode(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }
}
