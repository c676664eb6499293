use std::time::Duration;

use reqwest::{Method, StatusCode};

/// Failure raised by a [`Transport`](crate::Transport) before any HTTP status was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection-level failure (refused, reset, DNS, truncated body).
    #[error("network error: {0}")]
    Network(String),
    /// The request could not be built; never retried.
    #[error("invalid request: {0}")]
    Request(String),
    /// Error surfaced by `reqwest`.
    #[error("reqwest error: {0}")]
    Reqwest(reqwest::Error),
}

impl TransportError {
    /// Whether this failure is transient and eligible for the retry path.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Request(_) => false,
            Self::Reqwest(err) => err.is_timeout() || err.is_connect() || err.is_request() || err.is_body(),
        }
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The transport failed without producing a response.
    #[error("transport error on {method} {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: TransportError,
    },
    /// Non-success HTTP status.
    #[error("http error {status} on {method} {url}: {message}")]
    Http {
        status: u16,
        /// Server-provided message, or the canonical reason phrase.
        message: String,
        method: Method,
        url: String,
        /// Raw response body.
        body: serde_json::Value,
    },
    /// Response payload did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request queue has shut down.
    #[error("request pipeline is closed")]
    Closed,
    /// The dispatch task for a queued request died.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    /// Invalid options or missing runtime.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn http(
        status: u16,
        method: Method,
        url: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        let message = server_message(&body).unwrap_or_else(|| canonical_reason(status));
        Self::Http {
            status,
            message,
            method,
            url: url.into(),
            body,
        }
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message for the UI layer.
    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Network failure, timeout or 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_retryable(),
            Self::Http { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS.as_u16())
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }
}

/// Extracts `message` (or `error`) from a JSON error body.
pub(crate) fn server_message(body: &serde_json::Value) -> Option<String> {
    match body {
        serde_json::Value::Object(map) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|value| value.as_str()))
            .map(str::to_owned),
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        _ => None,
    }
}

fn canonical_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown status")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::{PipelineError, TransportError};

    #[test]
    fn http_error_prefers_server_message() {
        let err = PipelineError::http(
            401,
            Method::GET,
            "http://api/users",
            json!({"message": "Token expired"}),
        );
        assert_eq!(err.message(), "Token expired");
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_transient());
    }

    #[test]
    fn http_error_falls_back_to_error_field_then_reason() {
        let err = PipelineError::http(400, Method::POST, "u", json!({"error": "bad email"}));
        assert_eq!(err.message(), "bad email");

        let err = PipelineError::http(503, Method::GET, "u", json!(null));
        assert_eq!(err.message(), "Service Unavailable");
        assert!(err.is_transient());
    }

    #[test]
    fn rate_limit_and_not_found_helpers() {
        assert!(PipelineError::http(429, Method::GET, "u", json!({})).is_rate_limited());
        assert!(PipelineError::http(404, Method::GET, "u", json!({})).is_not_found());
    }

    #[test]
    fn transport_error_retryability() {
        assert!(TransportError::Network("reset".to_owned()).is_retryable());
        assert!(TransportError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!TransportError::Request("bad header".to_owned()).is_retryable());
    }
}
