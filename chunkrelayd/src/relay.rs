use std::sync::Arc;

use chunkrelay_core::{ChunkTracker, FaceAnalyzer, FileSink, MetadataStore, Publisher};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::ingest::{LoopStats, run_chunk_loop, run_message_loop};
use crate::router::{Assembler, ChunkRouter, WorkerContext};
use crate::shutdown::Shutdown;
use crate::transport::Transport;

/// Subscriptions the relay consumes.
pub struct Inputs {
    pub messages: UnboundedReceiver<Vec<u8>>,
    pub chunks: UnboundedReceiver<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeReport {
    pub messages: LoopStats,
    pub chunks: LoopStats,
}

/// The consumer: both intake loops plus everything they share.
pub struct Relay {
    settings: Settings,
    tracker: Arc<ChunkTracker>,
    sink: FileSink,
    store: Arc<dyn MetadataStore>,
    dispatcher: Arc<Dispatcher>,
}

impl Relay {
    pub fn new(
        settings: Settings,
        sink: FileSink,
        store: Arc<dyn MetadataStore>,
        analyzer: Arc<dyn FaceAnalyzer>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            analyzer,
            Arc::clone(&store),
            publisher,
            settings.device_id,
            settings.complete_channel.clone(),
        );
        Self::with_dispatcher(settings, sink, store, dispatcher)
    }

    pub fn with_dispatcher(
        settings: Settings,
        sink: FileSink,
        store: Arc<dyn MetadataStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            settings,
            tracker: Arc::new(ChunkTracker::new()),
            sink,
            store,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tracker(&self) -> Arc<ChunkTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn subscribe<T: Transport + ?Sized>(&self, transport: &T) -> Result<Inputs> {
        Ok(Inputs {
            messages: transport.subscribe(&self.settings.message_channel)?,
            chunks: transport.subscribe(&self.settings.chunk_channel)?,
        })
    }

    /// Run until both inputs close or `shutdown` fires, then drain the file
    /// workers.
    pub async fn serve(&self, inputs: Inputs, shutdown: Shutdown) -> Result<ServeReport> {
        let ctx = Arc::new(WorkerContext {
            assembler: Assembler::new(
                Arc::clone(&self.tracker),
                self.sink.clone(),
                self.settings.completion,
            ),
            dispatcher: Arc::clone(&self.dispatcher),
        });
        let router = ChunkRouter::new(ctx, self.settings.queue_depth);

        let messages = tokio::spawn(run_message_loop(
            inputs.messages,
            Arc::clone(&self.store),
            shutdown.clone(),
        ));
        let chunks = tokio::spawn(run_chunk_loop(inputs.chunks, router, shutdown));

        let (messages, chunks) = tokio::try_join!(messages, chunks)?;
        Ok(ServeReport { messages, chunks })
    }
}
