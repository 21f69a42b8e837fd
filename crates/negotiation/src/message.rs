use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope carried on the negotiation channel and the payload pipeline.
///
/// The whole envelope is MessagePack; `payload` holds a second MessagePack
/// document whose shape depends on `topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Routing topic, used for SUB prefix filtering.
    pub topic: String,

    /// Service instance that sent the message.
    pub sender: String,

    #[serde(with = "raw_bytes")]
    pub payload: Vec<u8>,

    pub timestamp: DateTime<Utc>,

    pub correlation_id: Uuid,

    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    1
}

impl Message {
    /// Build a message, encoding `payload` with MessagePack.
    pub fn new<T: Serialize>(
        topic: impl Into<String>,
        sender: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self::raw(topic, sender, rmp_serde::to_vec(payload)?))
    }

    /// Build a message around already-encoded payload bytes.
    pub fn raw(topic: impl Into<String>, sender: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            sender: sender.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
            version: 1,
        }
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Serialize `Vec<u8>` as a MessagePack bin rather than an array of ints.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
