//! The contract for the request/response auth endpoints.
//!
//! Scorelink doesn't issue or verify credentials itself. It calls into an
//! [`AuthApi`] implementation: the HTTP one that ships with the `scorelink`
//! crate in production, an in-memory fake in tests.

use std::future::Future;

use scorelink_protocol::Identity;

use crate::{Credential, SessionError};

/// A freshly issued credential together with the user it belongs to.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub credential: Credential,
    pub identity: Identity,
}

/// The result of renewing a credential.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub credential: Credential,
    /// Some endpoints return the refreshed profile alongside the token.
    pub identity: Option<Identity>,
}

/// Calls the auth endpoints.
///
/// Implementations must map a refused credential to
/// [`SessionError::Unauthorized`]. A profile fetch answered that way signs
/// the user out; a failed renewal is retried on the next check whatever
/// the variant.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchanges email + password for a credential.
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthGrant, SessionError>> + Send;

    /// Creates an account and issues its first credential.
    fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthGrant, SessionError>> + Send;

    /// Trades a still-valid credential for a fresh one.
    fn renew(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Renewal, SessionError>> + Send;

    /// Fetches the current profile of the credential's owner.
    fn fetch_profile(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Identity, SessionError>> + Send;

    /// Invalidates the credential server-side.
    fn revoke(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}
