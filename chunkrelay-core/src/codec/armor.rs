use crate::error::{RelayError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub fn wrap(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

/// Surrounding whitespace (a trailing newline from a line based transport)
/// is tolerated.
pub fn unwrap(payload: &[u8]) -> Result<Vec<u8>> {
    STANDARD
        .decode(payload.trim_ascii())
        .map_err(|e| RelayError::Decode(format!("base64: {e}")))
}
