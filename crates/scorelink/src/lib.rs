//! # Scorelink
//!
//! Client core for a live scoreboard.
//!
//! Scorelink keeps one authenticated push channel open to the scoreboard
//! server while the user's bearer credential rotates underneath it, and
//! applies server pushes to local session state. The UI only reads state
//! and subscribes to events; it never touches the socket.
//!
//! - [`Client`]: sign-in flows, connection control, state accessors
//! - [`ClientBuilder`]: configuration, observer, navigator
//! - [`ConnectionStatus`]: what the UI shows about the channel
//! - [`Observer`] / [`Navigator`]: where failures are reported
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scorelink::prelude::*;
//!
//! # async fn run() -> Result<(), ScorelinkError> {
//! let client = Client::builder().config(ClientConfig::from_env()).build()?;
//! client.login("ann@example.com", "hunter2").await?;
//! client.events().on_score_updated(|update| {
//!     println!("score is now {}", update.new_score);
//!     Ok(())
//! });
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod http;
mod observer;
mod refresh;

pub use client::{Client, ClientBuilder};
pub use config::{API_URL_ENV, ClientConfig, SOCKET_URL_ENV};
pub use connection::ConnectionStatus;
pub use error::ScorelinkError;
pub use http::HttpAuthApi;
pub use observer::{Navigator, Observer, TracingObserver};
pub use refresh::RefreshOutcome;

pub use scorelink_events::{DispatchReport, EventBus, Listener, ListenerError, ListenerId};
pub use scorelink_protocol::{
    EventKind, Identity, LeaderboardEntry, LeaderboardUpdated, PushEvent, ScoreUpdated, UserId,
};
pub use scorelink_session::{
    AuthApi, AuthGrant, Credential, CredentialStore, Renewal, ScoreApplied, SessionError,
    SessionSnapshot, SessionStore,
};
pub use scorelink_timing::{ReconnectPolicy, RefreshPolicy};

/// Everything an app needs to drive a client.
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ConnectionStatus, EventKind, Identity,
        LeaderboardUpdated, Navigator, Observer, PushEvent, ScoreUpdated, ScorelinkError,
    };
}
