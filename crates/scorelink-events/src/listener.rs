//! Listener trait and the ids used to remove listeners again.

use std::fmt;

use scorelink_protocol::PushEvent;

use crate::ListenerError;

/// Stable handle for one registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Something that reacts to pushed server events.
///
/// Called synchronously on the connection's task, so keep it short: hand
/// heavy work off to a channel. Any `Fn(&PushEvent) -> Result<(),
/// ListenerError>` closure is a listener.
pub trait Listener: Send + Sync + 'static {
    fn on_event(&self, event: &PushEvent) -> Result<(), ListenerError>;
}

impl<F> Listener for F
where
    F: Fn(&PushEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &PushEvent) -> Result<(), ListenerError> {
        self(event)
    }
}
