//! Byte encoding of [`ServerFrame`](crate::ServerFrame) and
//! [`ClientFrame`](crate::ClientFrame).
//!
//! The scoreboard server speaks JSON today. The connection actor is
//! written against [`Codec`] so that can change without touching it.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Turns frames into channel payloads and back.
///
/// Lives in the connection actor for the whole life of the client.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// [`ProtocolError::Encode`] if `value` has no representation.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// [`ProtocolError::Decode`] for a truncated payload, invalid syntax,
    /// or a frame type this client does not know.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// The JSON wire format of the scoreboard server.
///
/// ```rust
/// use scorelink_protocol::{ClientFrame, Codec, JsonCodec};
///
/// let frame = ClientFrame::Reauthenticate { token: "abc".into() };
///
/// let bytes = JsonCodec.encode(&frame).unwrap();
/// assert_eq!(bytes, br#"{"type":"Reauthenticate","token":"abc"}"#);
/// let back: ClientFrame = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(back, frame);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
