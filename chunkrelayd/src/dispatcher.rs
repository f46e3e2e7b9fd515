use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chunkrelay_core::codec;
use chunkrelay_core::{
    FaceAnalysisResult, FaceAnalyzer, FaceRecord, FileKey, MetadataStore, NotificationMessage,
    Publisher, RelayError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

/// Addresses of completion notices are drawn from `0..ADDRESS_SPACE`.
pub const ADDRESS_SPACE: i64 = 1000;

/// What one dispatch managed to do; every step may fail on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub faces: usize,
    pub face_saved: bool,
    pub notified: bool,
    pub address: i64,
}

/// Runs the downstream steps for a completed file: analysis, face
/// persistence and the completion notice.
pub struct Dispatcher {
    analyzer: Arc<dyn FaceAnalyzer>,
    store: Arc<dyn MetadataStore>,
    publisher: Arc<dyn Publisher>,
    device_id: i64,
    complete_channel: String,
    rng: Mutex<StdRng>,
}

impl Dispatcher {
    pub fn new(
        analyzer: Arc<dyn FaceAnalyzer>,
        store: Arc<dyn MetadataStore>,
        publisher: Arc<dyn Publisher>,
        device_id: i64,
        complete_channel: impl Into<String>,
    ) -> Self {
        Self::with_rng(
            analyzer,
            store,
            publisher,
            device_id,
            complete_channel,
            StdRng::from_entropy(),
        )
    }

    pub fn with_rng(
        analyzer: Arc<dyn FaceAnalyzer>,
        store: Arc<dyn MetadataStore>,
        publisher: Arc<dyn Publisher>,
        device_id: i64,
        complete_channel: impl Into<String>,
        rng: StdRng,
    ) -> Self {
        Self {
            analyzer,
            store,
            publisher,
            device_id,
            complete_channel: complete_channel.into(),
            rng: Mutex::new(rng),
        }
    }

    pub async fn dispatch(&self, key: &FileKey, path: PathBuf) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let faces = self.analyze(key, path).await;
        outcome.faces = faces.len();

        if let Some(first) = faces.first() {
            if faces.len() > 1 {
                info!(key = %key, dropped = faces.len() - 1, "keeping only the first face");
            }
            outcome.face_saved = self.save_face(key, first).await;
        }

        let address = self.next_address();
        outcome.address = address;
        let notice = NotificationMessage::new(address, format!("File Received:{}", key.name));
        outcome.notified = self.notify(key, &notice).await;
        outcome
    }

    fn next_address(&self) -> i64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..ADDRESS_SPACE)
    }

    async fn analyze(&self, key: &FileKey, path: PathBuf) -> Vec<FaceAnalysisResult> {
        let analyzer = Arc::clone(&self.analyzer);
        let res = tokio::task::spawn_blocking(move || analyzer.analyze(&path))
            .await
            .unwrap_or_else(|e| Err(RelayError::Analysis(e.to_string())));
        match res {
            Ok(faces) => faces,
            Err(e) => {
                warn!(key = %key, error = %e, "face analysis failed");
                Vec::new()
            }
        }
    }

    async fn save_face(&self, key: &FileKey, face: &FaceAnalysisResult) -> bool {
        let store = Arc::clone(&self.store);
        let rec = FaceRecord::from_result(self.device_id, face);
        let res = tokio::task::spawn_blocking(move || store.save_face(&rec))
            .await
            .unwrap_or_else(|e| Err(RelayError::Store(e.to_string())));
        match res {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "could not persist face");
                false
            }
        }
    }

    async fn notify(&self, key: &FileKey, notice: &NotificationMessage) -> bool {
        let payload = match codec::encode(notice) {
            Ok(p) => p,
            Err(e) => {
                warn!(key = %key, error = %e, "could not encode completion notice");
                return false;
            }
        };
        let publisher = Arc::clone(&self.publisher);
        let channel = self.complete_channel.clone();
        let res = tokio::task::spawn_blocking(move || publisher.publish(&channel, payload.as_bytes()))
            .await
            .unwrap_or_else(|e| Err(RelayError::Transport(e.to_string())));
        match res {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to confirm file delivery");
                false
            }
        }
    }
}
