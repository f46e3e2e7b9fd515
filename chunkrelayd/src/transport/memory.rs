use std::collections::HashMap;
use std::sync::Mutex;

use chunkrelay_core::{Publisher, RelayError, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::Transport;

/// In-process pub/sub. Keeps a log of everything published.
#[derive(Debug, Default)]
pub struct MemoryBus {
    subs: Mutex<HashMap<String, Vec<UnboundedSender<Vec<u8>>>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    closed: Mutex<bool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published on `channel`, oldest first.
    pub fn published(&self, channel: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .map(|log| {
                log.iter()
                    .filter(|(c, _)| c == channel)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// End every subscription; later publishes are still logged.
    pub fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        if let Ok(mut subs) = self.subs.lock() {
            subs.clear();
        }
    }
}

impl Publisher for MemoryBus {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        self.published
            .lock()
            .map_err(|e| RelayError::Transport(e.to_string()))?
            .push((channel.to_string(), payload.to_vec()));
        let mut subs = self
            .subs
            .lock()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        if let Some(list) = subs.get_mut(channel) {
            list.retain(|tx| tx.send(payload.to_vec()).is_ok());
        }
        Ok(())
    }
}

impl Transport for MemoryBus {
    fn subscribe(&self, channel: &str) -> Result<UnboundedReceiver<Vec<u8>>> {
        let closed = *self
            .closed
            .lock()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        if closed {
            return Err(RelayError::Closed(channel.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs
            .lock()
            .map_err(|e| RelayError::Transport(e.to_string()))?
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
