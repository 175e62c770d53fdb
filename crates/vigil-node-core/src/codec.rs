//! Wire codec: YAML envelope text inside length-prefixed frames.
//!
//! Every message on a node socket is `[4-byte length][payload]`. The length
//! prefix is an unsigned 32-bit count of payload bytes in network (big-endian)
//! byte order, the [`LengthDelimitedCodec`] default. The payload is the YAML
//! encoding of one envelope.
//!
//! Frame reads are all-or-nothing: until the full prefix and the full payload
//! have arrived, the codec reports "no message" rather than a partial value.

use tokio_util::codec::LengthDelimitedCodec;

use crate::value::Value;

/// Errors from envelope text encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_yaml::Error),

    #[error("failed to decode value: {0}")]
    Decode(#[source] serde_yaml::Error),
}

/// Encode a value as YAML payload bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(CodecError::Encode)
}

/// Decode YAML payload bytes back into a value.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    serde_yaml::from_slice(bytes).map_err(CodecError::Decode)
}

/// The framing codec shared by servers and clients.
///
/// Both sides must agree on the frame-size cap; a mismatch shows up as
/// connection resets instead of clean errors.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(crate::MAX_FRAME_LENGTH)
        .new_codec()
}
