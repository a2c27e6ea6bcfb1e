//! The credential store: holds the one "current" bearer credential.
//!
//! Backed by a `tokio::sync::watch` cell, so every replacement is a single
//! value swap. Readers see either the old credential or the new one, never
//! a half-written value, and anyone interested in rotations can subscribe.

use std::sync::Arc;

use tokio::sync::watch;

use crate::Credential;

/// Shared handle to the current credential.
///
/// Cloning the handle shares the same cell; it does not copy the
/// credential.
#[derive(Clone)]
pub struct CredentialStore {
    tx: Arc<watch::Sender<Option<Credential>>>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// The current credential, if any.
    pub fn current(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    /// Installs `credential` as the current one.
    pub fn replace(&self, credential: Credential) {
        self.tx.send_replace(Some(credential));
        tracing::debug!("credential replaced");
    }

    /// Installs `new` only if `expected` is still the current credential.
    ///
    /// Returns `false` (and leaves the store untouched) when the store was
    /// cleared or replaced in the meantime, e.g. the user signed out while
    /// a renewal was in flight.
    pub fn replace_if_current(&self, expected: &Credential, new: Credential) -> bool {
        self.replace_if_current_then(expected, new, || {})
    }

    /// Like [`replace_if_current`](Self::replace_if_current), and runs
    /// `then` after the swap while the store is still locked.
    ///
    /// A concurrent `clear` waits for `then` to return, so state written
    /// by `then` can never outlive a sign-out that raced with it.
    pub fn replace_if_current_then(
        &self,
        expected: &Credential,
        new: Credential,
        then: impl FnOnce(),
    ) -> bool {
        let replaced = self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(expected) {
                *current = Some(new);
                then();
                true
            } else {
                false
            }
        });
        if !replaced {
            tracing::debug!("credential changed underneath renewal, discarding");
        }
        replaced
    }

    /// Runs `f` only if `expected` is still the current credential, holding
    /// the store locked while it runs. Returns whether `f` ran.
    pub fn with_current(&self, expected: &Credential, f: impl FnOnce()) -> bool {
        let mut ran = false;
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(expected) {
                f();
                ran = true;
            }
            false
        });
        ran
    }

    /// Forgets the current credential. Idempotent.
    pub fn clear(&self) {
        let cleared = self.tx.send_if_modified(|current| current.take().is_some());
        if cleared {
            tracing::debug!("credential cleared");
        }
    }

    /// Watches credential rotations.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
