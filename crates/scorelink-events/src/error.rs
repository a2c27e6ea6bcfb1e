//! Error types for the event layer.

/// A listener failed to handle an event.
///
/// Returned by listeners; the bus logs it and moves on to the next
/// listener. Never propagated to the transport.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The listener rejected the event with a message.
    #[error("{0}")]
    Failed(String),

    /// The listener panicked. Carries the panic message when it was a
    /// string.
    #[error("listener panicked: {0}")]
    Panicked(String),

    /// Any other error the listener wants to bubble up.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ListenerError {
    /// Shorthand for [`ListenerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
