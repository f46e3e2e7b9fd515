//! Persisted tables and the boundary to whatever database holds them.
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{FaceAnalysisResult, NotificationMessage};
use crate::error::Result;

pub mod journal;
pub mod journal_store;

pub use journal_store::JournalStore;

/// Row of the metadata table: `(address, message, value, created)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetadataRecord {
    pub address: i64,
    pub message: String,
    pub value: ciborium::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl From<&NotificationMessage> for MetadataRecord {
    fn from(m: &NotificationMessage) -> Self {
        Self {
            address: m.address,
            message: m.message.clone(),
            value: m.value.clone(),
            created: m.created,
        }
    }
}

/// Row of the face table. `emotions` is stored comma delimited.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FaceRecord {
    pub device: i64,
    pub max_age: f64,
    pub min_age: f64,
    pub gender: String,
    pub gender_conf: f64,
    pub smile: bool,
    pub smile_conf: f64,
    pub emotions: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl FaceRecord {
    pub fn from_result(device: i64, f: &FaceAnalysisResult) -> Self {
        Self {
            device,
            max_age: f.max_age,
            min_age: f.min_age,
            gender: f.gender.clone(),
            gender_conf: f.gender_confidence,
            smile: f.smile,
            smile_conf: f.smile_confidence,
            emotions: f.emotions.join(","),
            created: f.created,
        }
    }
}

pub trait MetadataStore: Send + Sync {
    fn save_message(&self, rec: &MetadataRecord) -> Result<()>;

    fn save_face(&self, rec: &FaceRecord) -> Result<()>;
}
