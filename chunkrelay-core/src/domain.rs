// chunkrelay_core/src/domain.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// One numbered fragment of a larger file as it travels on the chunk channel.
///
/// `current` and `total` are 1-based and come from the sender unverified.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChunkMessage {
    pub id: String,
    pub name: String,
    pub current: u64,
    pub total: u64,
    #[serde(with = "serde_bytes_compat")]
    pub content: Vec<u8>,
}

impl ChunkMessage {
    pub fn key(&self) -> FileKey {
        FileKey::new(&self.id, &self.name)
    }
}

/// Composite identity of one logical file: message id plus declared name.
/// Its `Display` form is also the assembled file's name on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub id: String,
    pub name: String,
}

impl FileKey {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.id, self.name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationMessage {
    pub address: i64,
    pub message: String,
    #[serde(default = "null_value")]
    pub value: ciborium::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl NotificationMessage {
    pub fn new(address: i64, message: impl Into<String>) -> Self {
        Self {
            address,
            message: message.into(),
            value: ciborium::Value::Null,
            created: OffsetDateTime::now_utc(),
        }
    }
}

fn null_value() -> ciborium::Value {
    ciborium::Value::Null
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnalysisResult {
    pub min_age: f64,
    pub max_age: f64,
    pub gender: String,
    pub gender_confidence: f64,
    pub smile: bool,
    pub smile_confidence: f64,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(with = "time::serde::rfc3339", default = "now_utc")]
    pub created: OffsetDateTime,
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// CBOR has a native byte string type; without this `Vec<u8>` would be
/// encoded as an array of integers.
mod serde_bytes_compat {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let v = ciborium::Value::deserialize(d)?;
        match v {
            ciborium::Value::Bytes(b) => Ok(b),
            ciborium::Value::Array(items) => items
                .into_iter()
                .map(|i| match i {
                    ciborium::Value::Integer(n) => u8::try_from(n)
                        .map_err(|_| serde::de::Error::custom("byte out of range")),
                    _ => Err(serde::de::Error::custom("expected byte")),
                })
                .collect(),
            _ => Err(serde::de::Error::custom("expected byte string")),
        }
    }
}
