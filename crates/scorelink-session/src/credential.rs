//! The bearer credential and its embedded expiry.
//!
//! Credentials are JWTs issued by the auth endpoints. The client never
//! verifies the signature; it only reads the `exp` claim from the payload
//! segment so it can renew before the server starts refusing the token.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::SessionError;

/// An opaque bearer token.
///
/// Cheap to clone: the token text is shared. `Debug` redacts the token
/// so credentials never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: Arc<str>,
}

/// The only claim the client cares about.
#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

impl Credential {
    /// Wraps a token string issued by the auth endpoints.
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self { token: token.into() }
    }

    /// The raw token to present to the server.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decodes the `exp` claim from the token payload.
    ///
    /// # Errors
    /// [`SessionError::MalformedCredential`] if the token has no payload
    /// segment, the payload is not base64url JSON, or `exp` is missing or
    /// out of range.
    pub fn expires_at(&self) -> Result<DateTime<Utc>, SessionError> {
        let payload = self.token.split('.').nth(1).ok_or_else(|| {
            SessionError::MalformedCredential("missing payload segment".into())
        })?;
        // Some issuers keep the padding even though JWTs shouldn't have it.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| SessionError::MalformedCredential(e.to_string()))?;
        let claim: ExpiryClaim = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::MalformedCredential(e.to_string()))?;
        DateTime::from_timestamp(claim.exp, 0).ok_or_else(|| {
            SessionError::MalformedCredential(format!(
                "exp {} is out of range",
                claim.exp
            ))
        })
    }

    /// How long the credential stays valid after `now`.
    ///
    /// Negative once the credential has expired.
    pub fn remaining_validity(
        &self,
        now: DateTime<Utc>,
    ) -> Result<TimeDelta, SessionError> {
        Ok(self.expires_at()? - now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .finish()
    }
}
