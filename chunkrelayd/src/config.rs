use std::path::{Path, PathBuf};

use chunkrelay_core::CompletionPolicy;
use chunkrelay_core::bus::{CHUNK_CHANNEL, COMPLETE_CHANNEL, MESSAGE_CHANNEL};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

/// What came of looking for a `.env` file before the command line is parsed.
#[derive(Debug)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing,
    Invalid(String),
}

impl EnvFile {
    /// Report the outcome once tracing is up.
    pub fn log(&self) {
        match self {
            EnvFile::Loaded(path) => info!(path = %path.display(), "loaded environment file"),
            EnvFile::Missing => debug!("no .env file found; using the process environment"),
            EnvFile::Invalid(e) => warn!(error = %e, "ignoring unreadable .env file"),
        }
    }
}

/// Load `.env` from the working directory or one of its parents into the
/// process environment. Variables that are already set keep their value.
pub fn load_env_file() -> EnvFile {
    classify(dotenvy::dotenv())
}

pub fn load_env_file_from(path: &Path) -> EnvFile {
    classify(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

fn classify(res: std::result::Result<PathBuf, dotenvy::Error>) -> EnvFile {
    match res {
        Ok(path) => EnvFile::Loaded(path),
        Err(e) if e.not_found() => EnvFile::Missing,
        Err(e) => EnvFile::Invalid(e.to_string()),
    }
}

/// Backend for the message and face tables.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Append-only journal files
    Journal,
    /// Local libsql database
    Libsql,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "chunkrelay consumer: reassembles chunked files and reports completion", long_about = None)]
pub struct Config {
    /// Directory the assembled files are written to
    #[arg(long, env = "IMGS_PATH", default_value = "./imgs")]
    pub assembly_dir: PathBuf,

    /// Directory holding the persisted message and face tables
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Where message and face rows are persisted
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = StoreKind::Journal)]
    pub store: StoreKind,

    /// Device id face records are attributed to
    #[arg(long, env = "DEVICE_ID", default_value_t = 1)]
    pub device_id: i64,

    /// When a chunk completes its file: trust | verified
    #[arg(long = "completion", env = "COMPLETION_POLICY", default_value = "trust")]
    pub completion: CompletionPolicy,

    /// Chunks buffered per file before intake waits
    #[arg(long, env = "QUEUE_DEPTH", default_value_t = 64)]
    pub queue_depth: usize,

    /// Face analysis command; the file path is appended as last argument
    #[arg(long, env = "ANALYZER_CMD")]
    pub analyzer_cmd: Option<String>,

    #[arg(long, env = "MESSAGE_CHANNEL", default_value = MESSAGE_CHANNEL)]
    pub message_channel: String,

    #[arg(long, env = "CHUNK_CHANNEL", default_value = CHUNK_CHANNEL)]
    pub chunk_channel: String,

    #[arg(long, env = "COMPLETE_CHANNEL", default_value = COMPLETE_CHANNEL)]
    pub complete_channel: String,
}

/// Runtime knobs of a [`crate::Relay`], independent of where they came from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub device_id: i64,
    pub completion: CompletionPolicy,
    pub queue_depth: usize,
    pub message_channel: String,
    pub chunk_channel: String,
    pub complete_channel: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_id: 1,
            completion: CompletionPolicy::TrustSender,
            queue_depth: 64,
            message_channel: MESSAGE_CHANNEL.to_string(),
            chunk_channel: CHUNK_CHANNEL.to_string(),
            complete_channel: COMPLETE_CHANNEL.to_string(),
        }
    }
}

impl Config {
    pub fn settings(&self) -> Settings {
        Settings {
            device_id: self.device_id,
            completion: self.completion,
            queue_depth: self.queue_depth.max(1),
            message_channel: self.message_channel.clone(),
            chunk_channel: self.chunk_channel.clone(),
            complete_channel: self.complete_channel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cfg = Config::parse_from([
            "chunkrelayd",
            "--assembly-dir",
            "/tmp/imgs",
            "--completion",
            "verified",
            "--queue-depth",
            "0",
            "--device-id",
            "42",
        ]);
        assert_eq!(cfg.assembly_dir, PathBuf::from("/tmp/imgs"));
        let s = cfg.settings();
        assert_eq!(s.completion, CompletionPolicy::VerifiedCount);
        assert_eq!(s.queue_depth, 1);
        assert_eq!(s.device_id, 42);
    }

    #[test]
    fn env_file_feeds_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# deployment\nCOMPLETE_CHANNEL=assembled\n").unwrap();
        assert!(matches!(load_env_file_from(&path), EnvFile::Loaded(p) if p == path));

        let cfg = Config::parse_from(["chunkrelayd"]);
        assert_eq!(cfg.settings().complete_channel, "assembled");
    }

    #[test]
    fn missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_env_file_from(&dir.path().join("absent.env")),
            EnvFile::Missing
        ));
    }

    #[test]
    fn store_backend_is_selectable() {
        assert_eq!(Config::parse_from(["chunkrelayd"]).store, StoreKind::Journal);
        let cfg = Config::parse_from(["chunkrelayd", "--store", "libsql"]);
        assert_eq!(cfg.store, StoreKind::Libsql);
        assert!(Config::try_parse_from(["chunkrelayd", "--store", "postgres"]).is_err());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Config::try_parse_from(["chunkrelayd", "--completion", "maybe"]).is_err());
    }
}
