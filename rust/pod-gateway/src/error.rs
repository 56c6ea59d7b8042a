use thiserror::Error;

/// A failure to obtain any response from the remote side.
///
/// HTTP error statuses are not transport failures; they arrive as a
/// [`GatewayResponse`](crate::GatewayResponse) and are classified by the
/// caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A connection could not be established or was dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The request could not be built or the response could not be read
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportFailure {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportFailure::Protocol(_))
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportFailure::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            TransportFailure::Connection(error.to_string())
        } else {
            TransportFailure::Protocol(error.to_string())
        }
    }
}
