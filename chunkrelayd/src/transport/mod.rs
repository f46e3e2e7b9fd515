//! Inbound side of the messaging transport. Publishing lives in
//! [`chunkrelay_core::Publisher`]; a transport adds subscriptions.
use chunkrelay_core::{Publisher, Result};
use tokio::sync::mpsc::UnboundedReceiver;

pub mod lines;
pub mod memory;

pub use lines::LineTransport;
pub use memory::MemoryBus;

pub trait Transport: Publisher {
    /// Payloads published on `channel` from now on. The receiver yields
    /// `None` once the transport shuts the channel down.
    fn subscribe(&self, channel: &str) -> Result<UnboundedReceiver<Vec<u8>>>;
}
