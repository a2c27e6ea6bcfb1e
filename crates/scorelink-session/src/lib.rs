//! Credential and session state for Scorelink.
//!
//! This crate holds the two pieces of shared mutable state the client has:
//!
//! 1. **Credential**: the current bearer token ([`CredentialStore`]) and
//!    its decodable expiry ([`Credential::expires_at`])
//! 2. **Session**: who is signed in and their score ([`SessionStore`]),
//!    with timestamp-ordered resolution between profile snapshots and
//!    score pushes
//!
//! plus the [`AuthApi`] contract for the external auth endpoints.
//!
//! ```text
//! Client (above)  ← login/logout flows, refresh scheduler, connection actor
//!     ↕
//! Session Layer (this crate)  ← credential + identity cells
//!     ↕
//! Protocol Layer (below)  ← Identity, ScoreUpdated
//! ```

mod auth;
mod credential;
mod error;
mod session;
mod store;

pub use auth::{AuthApi, AuthGrant, Renewal};
pub use credential::Credential;
pub use error::SessionError;
pub use session::{ScoreApplied, SessionSnapshot, SessionStore};
pub use store::CredentialStore;
