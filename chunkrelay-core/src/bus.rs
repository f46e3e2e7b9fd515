use crate::error::Result;

pub const MESSAGE_CHANNEL: &str = "hello";
pub const CHUNK_CHANNEL: &str = "images";
pub const COMPLETE_CHANNEL: &str = "fileComplete";

/// Outbound half of the messaging transport. Blocking.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;
}
