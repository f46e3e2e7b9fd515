pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use chunkrelay_core::Result;
use clap::Parser;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Split {
            file,
            id,
            name,
            chunk_size,
            channel,
        } => handlers::handle_split(file, id, name, chunk_size, channel),
        Commands::Notify {
            message,
            address,
            channel,
        } => handlers::handle_notify(message, address, channel),
        Commands::Decode { payload, kind } => handlers::handle_decode(payload, kind),
        Commands::Records { data_dir, table } => handlers::handle_records(data_dir, table),
        Commands::Files { assembly_dir } => handlers::handle_files(assembly_dir),
    }
}
