//! Wire format shared by every channel: a CBOR encoded record, armored with
//! standard padded base64 so it travels as a plain text payload.
use crate::domain::{ChunkMessage, NotificationMessage};
use crate::error::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod armor;
pub mod cbor;

pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    let raw = cbor::to_vec(msg)?;
    Ok(armor::wrap(&raw))
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    let raw = armor::unwrap(payload)?;
    cbor::from_slice(&raw)
}

pub fn decode_chunk(payload: &[u8]) -> Result<ChunkMessage> {
    decode(payload)
}

pub fn decode_notification(payload: &[u8]) -> Result<NotificationMessage> {
    decode(payload)
}
