use chunkrelay_core::bus::{CHUNK_CHANNEL, MESSAGE_CHANNEL};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "chunkrelay developer CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    Chunk,
    Notification,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Table {
    Messages,
    Faces,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a file into chunk lines ready to feed the relay's stdin
    Split {
        file: PathBuf,
        /// message id shared by every chunk (defaults to a digest prefix)
        #[arg(long)]
        id: Option<String>,
        /// declared file name (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "chunk-size", default_value_t = 64 * 1024)]
        chunk_size: usize,
        #[arg(long, default_value = CHUNK_CHANNEL)]
        channel: String,
    },

    /// Emit one plain notification line
    Notify {
        message: String,
        #[arg(long, default_value_t = 0)]
        address: i64,
        #[arg(long, default_value = MESSAGE_CHANNEL)]
        channel: String,
    },

    /// Decode a base64 payload and print it
    Decode {
        payload: String,
        #[arg(long, value_enum, default_value_t = PayloadKind::Chunk)]
        kind: PayloadKind,
    },

    /// List records persisted in a data directory
    Records {
        data_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = Table::Messages)]
        table: Table,
    },

    /// List assembled files with size and blake3 digest
    Files { assembly_dir: PathBuf },
}
