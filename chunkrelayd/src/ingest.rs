//! The two intake loops, one per input channel.
use std::sync::Arc;

use chunkrelay_core::codec;
use chunkrelay_core::{MetadataRecord, MetadataStore, RelayError};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::router::{ChunkRouter, Routed};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub payloads: u64,
    /// Payloads that did not decode.
    pub rejected: u64,
    /// Decoded but not stored: a message the store refused, or a chunk of a
    /// file whose write had failed.
    pub failed: u64,
    /// Chunks for files that had already completed.
    pub redelivered: u64,
    /// Chunks dropped because shutdown arrived while their file's queue was
    /// full.
    pub interrupted: u64,
}

pub async fn run_chunk_loop(
    mut rx: UnboundedReceiver<Vec<u8>>,
    mut router: ChunkRouter,
    mut shutdown: Shutdown,
) -> LoopStats {
    let mut stats = LoopStats::default();
    loop {
        let payload = tokio::select! {
            _ = shutdown.wait() => {
                info!("chunk intake stopping");
                break;
            }
            next = rx.recv() => match next {
                Some(p) => p,
                None => {
                    info!("chunk channel closed");
                    break;
                }
            },
        };
        stats.payloads += 1;
        match codec::decode_chunk(&payload) {
            Ok(chunk) => {
                let routed = tokio::select! {
                    routed = router.route(chunk) => routed,
                    _ = shutdown.wait() => {
                        warn!("shutdown while a file queue was full; chunk dropped");
                        stats.interrupted += 1;
                        break;
                    }
                };
                match routed {
                    Routed::Queued => {}
                    Routed::Redelivered => stats.redelivered += 1,
                    Routed::Abandoned => stats.failed += 1,
                }
            }
            Err(e) => {
                warn!(error = %e, "undecodable chunk payload");
                stats.rejected += 1;
            }
        }
        router.reap();
    }
    debug!(workers = router.active_workers(), "draining file workers");
    router.drain().await;
    stats
}

pub async fn run_message_loop(
    mut rx: UnboundedReceiver<Vec<u8>>,
    store: Arc<dyn MetadataStore>,
    mut shutdown: Shutdown,
) -> LoopStats {
    let mut stats = LoopStats::default();
    loop {
        let payload = tokio::select! {
            _ = shutdown.wait() => {
                info!("message intake stopping");
                break;
            }
            next = rx.recv() => match next {
                Some(p) => p,
                None => {
                    info!("message channel closed");
                    break;
                }
            },
        };
        stats.payloads += 1;
        let msg = match codec::decode_notification(&payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "undecodable message payload");
                stats.rejected += 1;
                continue;
            }
        };
        let rec = MetadataRecord::from(&msg);
        let store = Arc::clone(&store);
        let res = tokio::task::spawn_blocking(move || store.save_message(&rec))
            .await
            .unwrap_or_else(|e| Err(RelayError::Store(e.to_string())));
        match res {
            Ok(()) => debug!(address = msg.address, "message stored"),
            Err(e) => {
                error!(address = msg.address, error = %e, "could not store message");
                stats.failed += 1;
            }
        }
    }
    stats
}
