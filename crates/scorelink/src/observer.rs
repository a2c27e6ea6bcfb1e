//! Seams for the UI: failure signals and sign-in routing.
//!
//! The client never renders anything. When something happens that a person
//! should know about, it calls one of these traits and carries on.

use scorelink_session::SessionError;

/// Receives failure signals that need no immediate action from the client.
pub trait Observer: Send + Sync + 'static {
    /// A scheduled credential renewal failed. The old credential is kept
    /// and the renewal is retried on the next check.
    fn on_renewal_failed(&self, error: &SessionError) {
        let _ = error;
    }

    /// The reconnect loop gave up after `attempts` consecutive failures.
    /// Status stays `Disconnected` until someone calls `connect` again.
    fn on_reconnect_exhausted(&self, attempts: u32) {
        let _ = attempts;
    }
}

/// Sends the user back to the sign-in view.
///
/// Called once the server refused the credential and the session has been
/// cleared.
pub trait Navigator: Send + Sync + 'static {
    fn route_to_sign_in(&self);
}

/// Default observer and navigator: writes everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_renewal_failed(&self, error: &SessionError) {
        tracing::warn!(error = %error, "credential renewal failed, keeping current credential");
    }

    fn on_reconnect_exhausted(&self, attempts: u32) {
        tracing::error!(attempts, "reconnect attempts exhausted, staying disconnected");
    }
}

impl Navigator for TracingObserver {
    fn route_to_sign_in(&self) {
        tracing::info!("credential rejected, sign-in required");
    }
}
