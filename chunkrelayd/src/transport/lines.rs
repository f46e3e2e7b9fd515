use std::collections::HashMap;
use std::io::{BufRead, Stdout, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chunkrelay_core::{Publisher, RelayError, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::Transport;

type Routes = Arc<Mutex<HashMap<String, UnboundedSender<Vec<u8>>>>>;

/// Text transport of `<channel> <payload>` lines: read from any `BufRead`,
/// published to a writer (stdout for the daemon).
pub struct LineTransport<W: Write + Send> {
    out: Mutex<W>,
    routes: Routes,
}

impl LineTransport<Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> LineTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start routing lines from `input` to the current subscribers. End of
    /// input closes every subscription. Subscribe before calling this.
    pub fn start_reader<R: BufRead + Send + 'static>(&self, input: R) -> JoinHandle<()> {
        let routes = Arc::clone(&self.routes);
        std::thread::spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        warn!(error = %e, "input read failed; closing transport");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some((channel, payload)) = line.trim().split_once(' ') else {
                    warn!(line = %line, "malformed transport line");
                    continue;
                };
                let Ok(map) = routes.lock() else { break };
                match map.get(channel) {
                    Some(tx) => {
                        if tx.send(payload.trim().as_bytes().to_vec()).is_err() {
                            debug!(channel, "subscriber gone; line dropped");
                        }
                    }
                    None => warn!(channel, "no subscriber for channel; line dropped"),
                }
            }
            if let Ok(mut map) = routes.lock() {
                map.clear();
            }
        })
    }

    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

impl<W: Write + Send> Publisher for LineTransport<W> {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let mut line = Vec::with_capacity(channel.len() + payload.len() + 2);
        line.extend_from_slice(channel.as_bytes());
        line.push(b' ');
        line.extend_from_slice(payload);
        line.push(b'\n');
        out.write_all(&line)
            .and_then(|_| out.flush())
            .map_err(|e| RelayError::Transport(format!("publish on {channel}: {e}")))
    }
}

impl<W: Write + Send> Transport for LineTransport<W> {
    fn subscribe(&self, channel: &str) -> Result<UnboundedReceiver<Vec<u8>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut map = self
            .routes
            .lock()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        if map.insert(channel.to_string(), tx).is_some() {
            warn!(channel, "channel resubscribed; previous subscriber closed");
        }
        Ok(rx)
    }
}
