//! Per-file workers. Every composite key gets one task that owns its file:
//! chunks for the key are written strictly in arrival order and completion
//! is judged only after the chunk's bytes are on disk.
use std::sync::Arc;

use chunkrelay_core::{ChunkMessage, ChunkTracker, CompletionPolicy, FileKey, FileSink, RelayError};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Written; the file is still incomplete.
    Pending,
    /// Position already written for this key; not written again.
    Duplicate,
    /// Written and it completed the file. Fires once per key.
    Complete { received: u64, total: u64 },
    /// Not written, the file is broken.
    Failed,
}

/// Write-then-judge logic for one chunk, shared by all workers.
pub struct Assembler {
    tracker: Arc<ChunkTracker>,
    sink: FileSink,
    policy: CompletionPolicy,
}

impl Assembler {
    pub fn new(tracker: Arc<ChunkTracker>, sink: FileSink, policy: CompletionPolicy) -> Self {
        Self {
            tracker,
            sink,
            policy,
        }
    }

    pub fn tracker(&self) -> &Arc<ChunkTracker> {
        &self.tracker
    }

    pub fn sink(&self) -> &FileSink {
        &self.sink
    }

    pub async fn accept(&self, key: &FileKey, chunk: ChunkMessage) -> Step {
        let (current, total) = (chunk.current, chunk.total);
        let last = current == total;
        if self.tracker.is_poisoned(key) {
            warn!(key = %key, current, total, "dropping chunk of a failed file");
            return Step::Failed;
        }

        let Some(received) = self.tracker.record_chunk(key, current) else {
            warn!(key = %key, current, total, "chunk position already written; dropped");
            return Step::Duplicate;
        };
        debug!(key = %key, current, total, received, bytes = chunk.content.len(), "chunk received");
        let is_final = self.policy.is_final(&chunk, received);

        let sink = self.sink.clone();
        let k = key.clone();
        let content = chunk.content;
        let written = tokio::task::spawn_blocking(move || sink.append(&k, &content))
            .await
            .unwrap_or_else(|e| Err(RelayError::Io(std::io::Error::other(e.to_string()))));
        if let Err(e) = written {
            error!(key = %key, current, total, error = %e, "could not write chunk; file abandoned");
            self.tracker.poison(key);
            return Step::Failed;
        }

        if !is_final {
            if last {
                warn!(key = %key, received, total, "last chunk arrived with chunks missing; not completing");
            }
            return Step::Pending;
        }
        if !self.tracker.finish(key) {
            return Step::Pending;
        }
        info!(key = %key, received, total, "saved {received} chunks out of {total}");
        Step::Complete { received, total }
    }
}

pub struct WorkerContext {
    pub assembler: Assembler,
    pub dispatcher: Arc<Dispatcher>,
}

type Workers = Arc<DashMap<FileKey, mpsc::Sender<ChunkMessage>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Queued,
    /// The key already completed; the chunk was dropped.
    Redelivered,
    /// A write for the key failed earlier; the chunk was dropped.
    Abandoned,
}

/// Hands chunks to their key's worker, spawning workers on first sight.
/// Owned by the chunk ingest loop.
pub struct ChunkRouter {
    ctx: Arc<WorkerContext>,
    workers: Workers,
    tasks: JoinSet<()>,
    queue_depth: usize,
}

impl ChunkRouter {
    pub fn new(ctx: Arc<WorkerContext>, queue_depth: usize) -> Self {
        Self {
            ctx,
            workers: Arc::new(DashMap::new()),
            tasks: JoinSet::new(),
            queue_depth: queue_depth.max(1),
        }
    }

    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Waits while the key's queue is full.
    pub async fn route(&mut self, chunk: ChunkMessage) -> Routed {
        let key = chunk.key();
        let tracker = Arc::clone(self.ctx.assembler.tracker());
        let mut chunk = chunk;
        loop {
            if tracker.is_completed(&key) {
                warn!(key = %key, current = chunk.current, total = chunk.total, "chunk for a completed file; dropped");
                return Routed::Redelivered;
            }
            if tracker.is_poisoned(&key) {
                warn!(key = %key, current = chunk.current, total = chunk.total, "chunk for a failed file; dropped");
                return Routed::Abandoned;
            }
            let existing = self.workers.get(&key).map(|tx| tx.clone());
            let tx = match existing {
                Some(tx) => tx,
                None => self.spawn(key.clone()),
            };
            match tx.send(chunk).await {
                Ok(()) => return Routed::Queued,
                Err(mpsc::error::SendError(back)) => {
                    // worker retired or died; the completed check above decides
                    chunk = back;
                    self.workers.remove(&key);
                }
            }
        }
    }

    /// Collect finished workers, logging any that panicked.
    pub fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            if let Err(e) = res {
                error!(error = %e, "chunk worker failed");
            }
        }
    }

    /// Stop feeding workers and wait for them to finish what is queued.
    pub async fn drain(mut self) {
        self.workers.clear();
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "chunk worker failed");
            }
        }
    }

    fn spawn(&mut self, key: FileKey) -> mpsc::Sender<ChunkMessage> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.workers.insert(key.clone(), tx.clone());
        debug!(key = %key, "starting file worker");
        self.tasks.spawn(run_worker(
            key,
            rx,
            Arc::clone(&self.ctx),
            Arc::clone(&self.workers),
        ));
        tx
    }
}

async fn run_worker(
    key: FileKey,
    mut rx: mpsc::Receiver<ChunkMessage>,
    ctx: Arc<WorkerContext>,
    workers: Workers,
) {
    while let Some(chunk) = rx.recv().await {
        match ctx.assembler.accept(&key, chunk).await {
            Step::Pending | Step::Duplicate => {}
            Step::Failed => {
                retire(&key, &mut rx, &workers);
                return;
            }
            Step::Complete { .. } => {
                retire(&key, &mut rx, &workers);
                complete(&key, &ctx).await;
                return;
            }
        }
    }
    debug!(key = %key, "file worker stopped");
}

fn retire(key: &FileKey, rx: &mut mpsc::Receiver<ChunkMessage>, workers: &Workers) {
    workers.remove(key);
    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(key = %key, dropped, "discarded chunks still queued for the file");
    }
}

async fn complete(key: &FileKey, ctx: &WorkerContext) {
    let sink = ctx.assembler.sink().clone();
    let path = match sink.path_for(key) {
        Ok(p) => p,
        Err(e) => {
            error!(key = %key, error = %e, "completed file has no path");
            return;
        }
    };
    let k = key.clone();
    match tokio::task::spawn_blocking(move || sink.digest(&k)).await {
        Ok(Ok(digest)) => info!(key = %key, blake3 = %digest, "file assembled"),
        Ok(Err(e)) => warn!(key = %key, error = %e, "could not fingerprint assembled file"),
        Err(e) => warn!(key = %key, error = %e, "could not fingerprint assembled file"),
    }
    let outcome = ctx.dispatcher.dispatch(key, path).await;
    info!(
        key = %key,
        faces = outcome.faces,
        face_saved = outcome.face_saved,
        notified = outcome.notified,
        address = outcome.address,
        "downstream dispatch finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(current: u64, total: u64, body: &[u8]) -> ChunkMessage {
        ChunkMessage {
            id: "a".into(),
            name: "f.jpg".into(),
            current,
            total,
            content: body.to_vec(),
        }
    }

    fn assembler(dir: &std::path::Path, policy: CompletionPolicy) -> Assembler {
        Assembler::new(
            Arc::new(ChunkTracker::new()),
            FileSink::open(dir).unwrap(),
            policy,
        )
    }

    #[tokio::test]
    async fn completes_after_the_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let asm = assembler(dir.path(), CompletionPolicy::TrustSender);
        let key = FileKey::new("a", "f.jpg");
        assert_eq!(asm.accept(&key, chunk(1, 2, b"AB")).await, Step::Pending);
        assert_eq!(
            asm.accept(&key, chunk(2, 2, b"CD")).await,
            Step::Complete {
                received: 2,
                total: 2
            }
        );
        assert_eq!(std::fs::read(dir.path().join("a-f.jpg")).unwrap(), b"ABCD");
        assert!(asm.tracker().is_completed(&key));
    }

    #[tokio::test]
    async fn single_chunk_completes_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let asm = assembler(dir.path(), CompletionPolicy::TrustSender);
        let key = FileKey::new("a", "f.jpg");
        assert!(matches!(
            asm.accept(&key, chunk(1, 1, b"X")).await,
            Step::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn verified_count_waits_for_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let key = FileKey::new("a", "f.jpg");

        let trusting = assembler(dir.path(), CompletionPolicy::TrustSender);
        trusting.accept(&key, chunk(1, 3, b"A")).await;
        assert!(matches!(
            trusting.accept(&key, chunk(3, 3, b"C")).await,
            Step::Complete { received: 2, .. }
        ));

        let other = tempfile::tempdir().unwrap();
        let strict = assembler(other.path(), CompletionPolicy::VerifiedCount);
        strict.accept(&key, chunk(1, 3, b"A")).await;
        assert_eq!(strict.accept(&key, chunk(3, 3, b"C")).await, Step::Pending);
        assert!(!strict.tracker().is_completed(&key));
    }

    #[tokio::test]
    async fn failed_write_poisons_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let asm = assembler(dir.path(), CompletionPolicy::TrustSender);
        let key = FileKey::new("a", "f.jpg");
        std::fs::create_dir(dir.path().join("a-f.jpg")).unwrap();
        assert_eq!(asm.accept(&key, chunk(1, 2, b"AB")).await, Step::Failed);
        assert!(asm.tracker().is_poisoned(&key));
        assert_eq!(asm.accept(&key, chunk(2, 2, b"CD")).await, Step::Failed);
        assert!(!asm.tracker().is_completed(&key));
    }

    #[tokio::test]
    async fn repeated_position_is_not_written_twice() {
        let dir = tempfile::tempdir().unwrap();
        let asm = assembler(dir.path(), CompletionPolicy::TrustSender);
        let key = FileKey::new("a", "f.jpg");
        assert_eq!(asm.accept(&key, chunk(1, 2, b"AB")).await, Step::Pending);
        assert_eq!(asm.accept(&key, chunk(1, 2, b"AB")).await, Step::Duplicate);
        assert_eq!(
            asm.accept(&key, chunk(2, 2, b"CD")).await,
            Step::Complete {
                received: 2,
                total: 2
            }
        );
        assert_eq!(std::fs::read(dir.path().join("a-f.jpg")).unwrap(), b"ABCD");
    }

    #[tokio::test]
    async fn verified_count_is_not_fooled_by_a_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let asm = assembler(dir.path(), CompletionPolicy::VerifiedCount);
        let key = FileKey::new("a", "f.jpg");
        asm.accept(&key, chunk(1, 3, b"A")).await;
        assert_eq!(asm.accept(&key, chunk(1, 3, b"A")).await, Step::Duplicate);
        assert_eq!(asm.accept(&key, chunk(3, 3, b"C")).await, Step::Pending);
        assert!(!asm.tracker().is_completed(&key));
        assert_eq!(asm.tracker().received(&key), Some(2));
        assert_eq!(std::fs::read(dir.path().join("a-f.jpg")).unwrap(), b"AC");
    }

    #[tokio::test]
    async fn verified_count_completes_on_a_late_middle_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let asm = assembler(dir.path(), CompletionPolicy::VerifiedCount);
        let key = FileKey::new("a", "f.jpg");
        asm.accept(&key, chunk(1, 3, b"A")).await;
        assert_eq!(asm.accept(&key, chunk(3, 3, b"C")).await, Step::Pending);
        assert_eq!(
            asm.accept(&key, chunk(2, 3, b"B")).await,
            Step::Complete {
                received: 3,
                total: 3
            }
        );
        assert!(asm.tracker().is_completed(&key));
    }

    fn router(dir: &std::path::Path) -> ChunkRouter {
        let store = Arc::new(chunkrelay_core::JournalStore::open(&dir.join("data")).unwrap());
        let dispatcher = Dispatcher::new(
            Arc::new(chunkrelay_core::DisabledAnalyzer),
            store,
            Arc::new(crate::transport::MemoryBus::new()),
            1,
            "fileComplete",
        );
        let ctx = WorkerContext {
            assembler: assembler(&dir.join("imgs"), CompletionPolicy::TrustSender),
            dispatcher: Arc::new(dispatcher),
        };
        ChunkRouter::new(Arc::new(ctx), 4)
    }

    #[tokio::test]
    async fn failed_files_get_no_new_worker() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router(dir.path());
        let key = FileKey::new("a", "f.jpg");
        router.ctx.assembler.tracker().poison(&key);

        assert_eq!(router.route(chunk(1, 3, b"A")).await, Routed::Abandoned);
        assert_eq!(router.active_workers(), 0);

        let other = ChunkMessage {
            id: "b".into(),
            ..chunk(1, 1, b"X")
        };
        assert_eq!(router.route(other).await, Routed::Queued);
        router.drain().await;
    }

    #[tokio::test]
    async fn worker_retires_after_a_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router(dir.path());
        std::fs::create_dir_all(dir.path().join("imgs").join("a-f.jpg")).unwrap();

        assert_eq!(router.route(chunk(1, 3, b"A")).await, Routed::Queued);
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while router.active_workers() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker retired");
        assert_eq!(router.route(chunk(2, 3, b"B")).await, Routed::Abandoned);
        assert_eq!(router.active_workers(), 0);
        router.drain().await;
    }
}
