use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("device returned HTTP {status}")]
    Status { status: reqwest::StatusCode },
    #[error("response body is not valid JSON: {0}")]
    Body(#[source] reqwest::Error),
}

impl TransportError {
    /// Classifies a reqwest error raised while sending the request.
    pub(crate) fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response root is not a JSON object")]
    NotAnObject,
    #[error("missing '{path}' key in response")]
    MissingData { path: &'static str },
    #[error("'{path}' is not an array")]
    DataNotArray { path: &'static str },
    #[error("insufficient channels: expected at least 2, got {found}")]
    InsufficientChannels { found: usize },
    #[error("malformed channel at index {index}: {reason}")]
    MalformedChannel { index: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("could not update: {0}")]
    Transport(#[from] TransportError),
    #[error("could not update: invalid API response format: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid IP address format: '{0}'")]
    InvalidHost(String),
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(i64),
    #[error("scan interval must be between {min} and {max} seconds, got {actual}")]
    ScanIntervalOutOfRange { min: u64, max: u64, actual: u64 },
    #[error("{name} is not a valid number: '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("unknown envelope '{0}', expected 'flat' or 'nested'")]
    InvalidEnvelope(String),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot connect to device: {0}")]
    CannotConnect(#[source] TransportError),
    #[error("device sent an unexpected response: {0}")]
    InvalidResponse(#[source] ParseError),
    #[error("device {0} is already configured")]
    AlreadyConfigured(String),
    #[error("device {0} is not configured")]
    NotFound(String),
    #[error("device not ready: {0}")]
    NotReady(#[source] UpdateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_messages_name_the_problem() {
        assert!(ParseError::InsufficientChannels { found: 1 }
            .to_string()
            .starts_with("insufficient channels"));
        let malformed = ParseError::MalformedChannel {
            index: 0,
            reason: "expected at least 4 elements, got 2".to_string(),
        };
        assert!(malformed
            .to_string()
            .starts_with("malformed channel at index 0"));
    }

    #[test]
    fn test_update_error_is_reported_as_could_not_update() {
        let err = UpdateError::from(ParseError::MissingData { path: "data" });
        assert_eq!(
            err.to_string(),
            "could not update: invalid API response format: missing 'data' key in response"
        );
    }
}
