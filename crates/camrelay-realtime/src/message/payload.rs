//! Opaque frame payload carried as base64 on the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Frame bytes. Cloning shares the underlying buffer, so fan-out to many
/// consumers does not copy the frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramePayload(pub Bytes);

impl FramePayload {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for FramePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for FramePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(|raw| Self(Bytes::from(raw)))
            .map_err(|e| serde::de::Error::custom(format!("payload is not valid base64: {e}")))
    }
}
