//! Pluggable message serialization for the RPC fabric.
//!
//! The fabric moves handler arguments and replies around as opaque byte
//! blobs; the [`MessageCodec`] trait is the only boundary where values and
//! bytes meet. [`JsonCodec`] is the default implementation, handy because
//! dropped or mangled payloads are human-readable in logs. Harnesses that
//! want a denser format implement the trait themselves.
//!
//! The fabric relies on one property only: a value encoded as `T` must
//! decode back as `T` unchanged, across both the client→server argument hop
//! and the server→client reply hop.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a value to bytes.
    #[error("encode error: {0}")]
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes to a value.
    #[error("decode error: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

/// Pluggable value↔bytes marshalling.
///
/// Implementations must be cheap to clone; the fabric stores a clone in
/// every client end and inside every registered handler.
///
/// Argument and reply types go through serde, so anything a handler accepts
/// or returns must implement `Serialize`/`DeserializeOwned`.
pub trait MessageCodec: Clone + Send + Sync + 'static {
    /// Encode a value to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using `serde_json`.
///
/// The default codec for the fabric. Not the most compact wire form, but
/// every payload in a failing test is directly readable.
///
/// # Examples
///
/// ```
/// use simrpc::{JsonCodec, MessageCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&("reboot", 3u32)).unwrap();
/// let (what, count): (String, u32) = codec.decode(&bytes).unwrap();
/// assert_eq!((what.as_str(), count), ("reboot", 3));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Envelope {
        seq: u64,
        body: String,
    }

    #[test]
    fn test_roundtrip_struct() {
        let codec = JsonCodec;
        let msg = Envelope {
            seq: 9,
            body: "append".to_string(),
        };

        let bytes = codec.encode(&msg).expect("encode should succeed");
        let decoded: Envelope = codec.decode(&bytes).expect("decode should succeed");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_roundtrip_primitives() {
        let codec = JsonCodec;

        let n = 111i64;
        let bytes = codec.encode(&n).expect("encode should succeed");
        let decoded: i64 = codec.decode(&bytes).expect("decode should succeed");
        assert_eq!(n, decoded);

        let s = "handler2-111".to_string();
        let bytes = codec.encode(&s).expect("encode should succeed");
        let decoded: String = codec.decode(&bytes).expect("decode should succeed");
        assert_eq!(s, decoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = JsonCodec;
        let result: Result<Envelope, CodecError> = codec.decode(b"not json {");
        let err = result.expect_err("garbage should not decode");
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(err.to_string().contains("decode error"));
    }

    #[test]
    fn test_type_mismatch_fails() {
        let codec = JsonCodec;
        let bytes = codec.encode(&true).expect("encode should succeed");
        let result: Result<Envelope, CodecError> = codec.decode(&bytes);
        assert!(result.is_err());
    }
}
