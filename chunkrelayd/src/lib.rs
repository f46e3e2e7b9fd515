#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod relay;
pub mod router;
pub mod shutdown;
pub mod sqlstore;
pub mod telemetry;
pub mod transport;

use std::io::BufReader;
use std::sync::Arc;

use chunkrelay_core::{
    CommandAnalyzer, DisabledAnalyzer, FaceAnalyzer, FileSink, JournalStore, MetadataStore,
};
use tracing::{info, warn};

pub use config::{Config, Settings, StoreKind};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{DaemonError, Result};
pub use relay::{Inputs, Relay, ServeReport};
pub use sqlstore::SqlStore;
pub use transport::{LineTransport, MemoryBus, Transport};

/// Wire the relay to stdin/stdout and run it until input ends or a signal
/// arrives.
pub async fn run(config: Config) -> Result<()> {
    let settings = config.settings();
    info!(
        assembly_dir = %config.assembly_dir.display(),
        data_dir = %config.data_dir.display(),
        completion = %settings.completion,
        store = ?config.store,
        "initializing consumer"
    );

    let sink = FileSink::open(&config.assembly_dir)?;
    let store: Arc<dyn MetadataStore> = match config.store {
        StoreKind::Journal => Arc::new(JournalStore::open(&config.data_dir)?),
        StoreKind::Libsql => Arc::new(SqlStore::open(&config.data_dir).await?),
    };
    let analyzer: Arc<dyn FaceAnalyzer> = match config
        .analyzer_cmd
        .as_deref()
        .and_then(CommandAnalyzer::from_command_line)
    {
        Some(a) => Arc::new(a),
        None => {
            warn!("no analyzer configured; completed files report zero faces");
            Arc::new(DisabledAnalyzer)
        }
    };

    let transport = Arc::new(LineTransport::stdio());
    let relay = Relay::new(settings, sink, store, analyzer, transport.clone());
    let inputs = relay.subscribe(transport.as_ref())?;
    transport.start_reader(BufReader::new(std::io::stdin()));

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(shutdown::on_signal(trigger));

    info!("consumer initialized; waiting for messages");
    let report = relay.serve(inputs, shutdown).await?;
    info!(
        messages = report.messages.payloads,
        chunks = report.chunks.payloads,
        rejected = report.messages.rejected + report.chunks.rejected,
        redelivered = report.chunks.redelivered,
        failed = report.chunks.failed,
        interrupted = report.chunks.interrupted,
        completed = relay.tracker().completed_keys(),
        incomplete = relay.tracker().live_keys(),
        "consumer stopped"
    );
    Ok(())
}
