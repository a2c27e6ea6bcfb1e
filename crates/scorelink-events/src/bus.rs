//! The event bus: ordered per-category listener lists.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use scorelink_protocol::{EventKind, LeaderboardUpdated, PushEvent, ScoreUpdated};

use crate::{Listener, ListenerError, ListenerId};

type Registry = HashMap<EventKind, Vec<(ListenerId, Arc<dyn Listener>)>>;

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

/// Routes pushed events to the listeners registered for their category.
///
/// # Delivery guarantees
///
/// - Listeners for a category run in registration order.
/// - A dispatch calls exactly the listeners registered when it began. One
///   removed mid-dispatch may still see that event; one removed earlier
///   never does.
/// - A listener that errors or panics is logged and skipped. The rest still
///   run.
/// - Each physical message is delivered at most once. Events sent while the
///   connection was down are lost: there is no buffering or replay across a
///   reconnect. Refetch full state when the connection comes back.
///
/// Cloning the bus shares the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` to the list for `kind`.
    pub fn subscribe(&self, kind: EventKind, listener: impl Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        tracing::debug!(%kind, listener = %id, "listener subscribed");
        id
    }

    /// Removes a listener. Returns `false` if it was not registered for
    /// `kind`.
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let Some(list) = registry.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if removed {
            tracing::debug!(%kind, listener = %id, "listener unsubscribed");
        }
        removed
    }

    /// Typed shortcut for `score_update` listeners.
    pub fn on_score_updated<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ScoreUpdated) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe(EventKind::ScoreUpdated, move |event: &PushEvent| {
            match event {
                PushEvent::ScoreUpdated(update) => f(update),
                _ => Ok(()),
            }
        })
    }

    /// Typed shortcut for `leaderboard_update` listeners.
    pub fn on_leaderboard_updated<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&LeaderboardUpdated) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe(EventKind::LeaderboardUpdated, move |event: &PushEvent| {
            match event {
                PushEvent::LeaderboardUpdated(board) => f(board),
                _ => Ok(()),
            }
        })
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Delivers `event` to every listener registered for its category.
    pub fn dispatch(&self, event: &PushEvent) -> DispatchReport {
        let kind = event.kind();
        // Snapshot under the lock, call outside it, so listeners may
        // subscribe or unsubscribe without deadlocking.
        let listeners: Vec<(ListenerId, Arc<dyn Listener>)> =
            self.lock().get(&kind).cloned().unwrap_or_default();

        let mut report = DispatchReport::default();
        for (id, listener) in listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)))
                .unwrap_or_else(|payload| Err(ListenerError::Panicked(panic_message(&*payload))));
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%kind, listener = %id, error = %e, "listener failed");
                }
            }
        }

        tracing::trace!(
            %kind,
            delivered = report.delivered,
            failed = report.failed,
            "event dispatched"
        );
        report
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Listeners never run under this lock, so a poisoned registry is
        // still consistent.
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
