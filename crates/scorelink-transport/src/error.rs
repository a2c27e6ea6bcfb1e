/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connect request could not be built (bad URL, bad header value).
    #[error("invalid connect request: {0}")]
    InvalidRequest(String),

    /// Reaching the server or completing the upgrade failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The server answered the upgrade request with an HTTP error status.
    #[error("handshake rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` when the server refused the presented credential.
    ///
    /// Retrying with the same credential cannot succeed, so callers must
    /// not feed these errors into a backoff loop.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth_rejection_for_unauthorized_and_forbidden() {
        assert!(TransportError::Rejected { status: 401 }.is_auth_rejection());
        assert!(TransportError::Rejected { status: 403 }.is_auth_rejection());
    }

    #[test]
    fn test_is_auth_rejection_false_for_other_failures() {
        assert!(!TransportError::Rejected { status: 502 }.is_auth_rejection());
        assert!(
            !TransportError::ConnectionClosed("reset".into()).is_auth_rejection()
        );
    }
}
