use std::fmt;
use std::str::FromStr;

use crate::domain::ChunkMessage;

/// When a chunk counts as the last one of its file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// `current == total`, exactly as the sender numbered it.
    #[default]
    TrustSender,
    /// `total` distinct positions have been written for the key, whichever
    /// of them arrives last.
    VerifiedCount,
}

impl CompletionPolicy {
    /// `received` is the number of distinct positions recorded for the key,
    /// this chunk included.
    pub fn is_final(&self, chunk: &ChunkMessage, received: u64) -> bool {
        match self {
            CompletionPolicy::TrustSender => chunk.current == chunk.total,
            CompletionPolicy::VerifiedCount => received == chunk.total,
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust" | "trust-sender" => Ok(CompletionPolicy::TrustSender),
            "verified" | "verified-count" => Ok(CompletionPolicy::VerifiedCount),
            other => Err(format!(
                "unknown completion policy {other:?} (expected trust|verified)"
            )),
        }
    }
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionPolicy::TrustSender => f.write_str("trust"),
            CompletionPolicy::VerifiedCount => f.write_str("verified"),
        }
    }
}
