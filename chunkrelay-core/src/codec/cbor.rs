use crate::error::{RelayError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(256);
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| RelayError::Encode(format!("cbor: {e}")))?;
    Ok(out)
}

pub fn from_slice<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    ciborium::de::from_reader(raw).map_err(|e| RelayError::Decode(format!("cbor: {e}")))
}
