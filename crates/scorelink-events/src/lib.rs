//! Push event distribution for Scorelink.
//!
//! Server pushes arrive on the connection task and fan out through an
//! [`EventBus`] to whoever registered for their category.
//!
//! # Key types
//!
//! - [`EventBus`]: ordered listener lists keyed by [`EventKind`]
//! - [`Listener`]: the trait listeners implement (closures work too)
//! - [`ListenerId`]: stable handle for unsubscribing
//! - [`DispatchReport`]: how many listeners succeeded or failed
//!
//! [`EventKind`]: scorelink_protocol::EventKind

mod bus;
mod error;
mod listener;

pub use bus::{DispatchReport, EventBus};
pub use error::ListenerError;
pub use listener::{Listener, ListenerId};
