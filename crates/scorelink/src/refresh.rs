//! Credential refresh scheduler.
//!
//! While someone is signed in, checks the credential once immediately and
//! then every [`RefreshPolicy::interval`]. When less than the safety margin
//! of validity remains, renews it through [`AuthApi::renew`], swaps it into
//! the store, and asks the connection actor to present it on the live
//! channel. The loop ends on its own when the session signs out.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use scorelink_session::{AuthApi, CredentialStore, Renewal, SessionError, SessionStore};
use scorelink_timing::{RefreshPolicy, RefreshTicker, TaskHandle};
use scorelink_transport::Connection;

use crate::Observer;
use crate::connection::ConnectionHandle;

/// Result of one credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nobody is signed in.
    NoCredential,
    /// The credential has enough validity left.
    NotDue { remaining: TimeDelta },
    /// A fresh credential was installed and re-presented.
    Renewed,
    /// The credential changed while the renewal was in flight (sign-out or
    /// a newer sign-in); the renewed one was discarded.
    Superseded,
}

/// Everything one credential check touches.
pub(crate) struct Refresher<A, K> {
    pub(crate) auth: Arc<A>,
    pub(crate) credentials: CredentialStore,
    pub(crate) session: SessionStore,
    pub(crate) connection: ConnectionHandle<K>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) policy: RefreshPolicy,
}

impl<A, K> Clone for Refresher<A, K> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            credentials: self.credentials.clone(),
            session: self.session.clone(),
            connection: self.connection.clone(),
            observer: Arc::clone(&self.observer),
            policy: self.policy,
        }
    }
}

impl<A: AuthApi, K: Connection> Refresher<A, K> {
    /// Renews the current credential if it is inside the safety margin.
    ///
    /// # Errors
    /// [`SessionError::MalformedCredential`] if the expiry cannot be read,
    /// or whatever [`AuthApi::renew`] failed with. The current credential
    /// is left in place either way.
    pub(crate) async fn refresh_if_needed(&self) -> Result<RefreshOutcome, SessionError> {
        let Some(current) = self.credentials.current() else {
            return Ok(RefreshOutcome::NoCredential);
        };

        let remaining = current.remaining_validity(Utc::now())?;
        if !self.policy.renewal_due(remaining) {
            tracing::trace!(remaining_secs = remaining.num_seconds(), "credential not due");
            return Ok(RefreshOutcome::NotDue { remaining });
        }

        tracing::info!(remaining_secs = remaining.num_seconds(), "renewing credential");
        let renewal = self.auth.renew(&current).await?;

        let Renewal {
            credential,
            identity,
        } = renewal;
        let swapped = self.credentials.replace_if_current_then(&current, credential, || {
            if let Some(identity) = identity {
                self.session.replace_identity(identity);
            }
        });
        if !swapped {
            return Ok(RefreshOutcome::Superseded);
        }
        self.connection.represent().await;

        tracing::info!("credential renewed");
        Ok(RefreshOutcome::Renewed)
    }

    /// Spawns the periodic check loop.
    pub(crate) fn start(self) -> TaskHandle {
        TaskHandle::spawn("credential-refresh", self.run())
    }

    async fn run(self) {
        let mut ticker = RefreshTicker::new(self.policy);
        let mut session = self.session.subscribe();

        loop {
            if !session.borrow_and_update().is_authenticated() {
                break;
            }
            tokio::select! {
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.wait_for_tick() => {
                    if let Err(e) = self.refresh_if_needed().await {
                        self.observer.on_renewal_failed(&e);
                    }
                }
            }
        }

        tracing::debug!("refresh loop stopped, session signed out");
    }
}
