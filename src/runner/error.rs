use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the runner client.
///
/// `NotFound` and `ServiceUnavailable` act as sentinels: callers match on
/// them to decide between recovery (pull-on-missing, "not running" hints)
/// and plain failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("model not found: {reference}")]
    NotFound { reference: String },

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("error querying {path}: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} failed with status {status}: {body}")]
    Api {
        operation: String,
        status: StatusCode,
        body: String,
    },

    /// 409 from `_configure`; the server-provided body is surfaced verbatim.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    StreamProtocol(String),

    #[error("unexpected end of stream while pulling model {reference}")]
    UnexpectedEndOfStream { reference: String },

    #[error("error reading response stream: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("{0}")]
    Validation(String),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ClientError {
    /// True when the failure means the runner is absent or still starting,
    /// i.e. the caller should suggest checking that the service is running.
    pub fn is_not_running(&self) -> bool {
        matches!(self, ClientError::ServiceUnavailable)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_reference() {
        let err = ClientError::NotFound {
            reference: "ai/smollm2".to_string(),
        };
        assert_eq!(err.to_string(), "model not found: ai/smollm2");
    }

    #[test]
    fn service_unavailable_is_not_running() {
        assert!(ClientError::ServiceUnavailable.is_not_running());
        assert!(!ClientError::Validation("bad backend".into()).is_not_running());
    }
}
