//! Error types for the session layer.

/// Errors produced while holding or renewing a user's credential.
///
/// The auth endpoints live outside this crate; implementations of
/// [`AuthApi`](crate::AuthApi) translate their failures into these
/// variants so the client can tell "sign the user out" apart from
/// "try again later".
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credential is not a decodable bearer token (no payload segment,
    /// bad base64, or no `exp` claim).
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// The server refused the credential. The session cannot continue.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server processed the request but declined it, e.g. wrong
    /// password or an already registered email.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The endpoint could not be reached or answered with garbage.
    /// Worth retrying later.
    #[error("auth endpoint unavailable: {0}")]
    Unavailable(String),
}

impl SessionError {
    /// Returns `true` when the error means the credential is no longer
    /// usable and the user has to sign in again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
