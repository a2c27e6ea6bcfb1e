//! Unified error type for the Scorelink client.

use scorelink_events::ListenerError;
use scorelink_protocol::ProtocolError;
use scorelink_session::SessionError;
use scorelink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ScorelinkError {
    /// A transport-level error (dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth endpoints, malformed credential).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A listener failed while handling a push.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// The operation needs a signed-in user and there is none.
    #[error("not signed in")]
    NotSignedIn,

    /// The client could not be set up (bad URL, TLS backend failure).
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ScorelinkError {
    /// `true` when the error means the user has to sign in again.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Session(e) => e.is_unauthorized(),
            Self::Transport(e) => e.is_auth_rejection(),
            _ => false,
        }
    }
}
