//! Wire protocol for Scorelink.
//!
//! This crate defines what travels over the push channel:
//!
//! - **Types** ([`ServerFrame`], [`ClientFrame`], [`PushEvent`], etc.):
//!   the frames the server pushes and the few the client sends back.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! ```text
//! Transport (bytes) → Protocol (ServerFrame) → Events / Session
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientFrame, EventKind, Identity, LeaderboardEntry, LeaderboardUpdated,
    PushEvent, ScoreUpdated, ServerFrame, UserId,
};
