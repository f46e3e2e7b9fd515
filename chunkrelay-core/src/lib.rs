#![forbid(unsafe_code)]

pub mod error;

pub mod util {
    pub mod sanitize;
    pub mod varint;
}

pub mod domain;

pub mod codec;

pub mod analysis;
pub mod bus;
pub mod completion;
pub mod sink;
pub mod store;
pub mod tracker;

// Re-exports: stable API surface
pub use analysis::{CommandAnalyzer, DisabledAnalyzer, FaceAnalyzer};
pub use bus::Publisher;
pub use completion::CompletionPolicy;
pub use domain::{ChunkMessage, FaceAnalysisResult, FileKey, NotificationMessage};
pub use error::{RelayError, Result};
pub use sink::FileSink;
pub use store::{FaceRecord, JournalStore, MetadataRecord, MetadataStore};
pub use tracker::ChunkTracker;
