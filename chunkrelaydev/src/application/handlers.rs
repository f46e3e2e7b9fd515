use std::path::{Path, PathBuf};

use chunkrelay_core::codec;
use chunkrelay_core::sink::digest_file;
use chunkrelay_core::store::journal_store::{read_faces, read_messages};
use chunkrelay_core::{ChunkMessage, FileKey, NotificationMessage, RelayError, Result};
use walkdir::WalkDir;

use crate::presentation::cli::{PayloadKind, Table};

/// Cut `data` into 1-based chunk messages. An empty input still yields one
/// empty chunk so the receiver sees a completion.
fn chunk_messages(id: &str, name: &str, data: &[u8], chunk_size: usize) -> Vec<ChunkMessage> {
    let pieces: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(chunk_size.max(1)).collect()
    };
    let total = pieces.len() as u64;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, p)| ChunkMessage {
            id: id.to_string(),
            name: name.to_string(),
            current: i as u64 + 1,
            total,
            content: p.to_vec(),
        })
        .collect()
}

fn line(channel: &str, payload: &str) -> String {
    format!("{channel} {payload}")
}

fn default_name(file: &Path) -> Result<String> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| RelayError::InvalidName(file.display().to_string()))
}

pub fn handle_split(
    file: PathBuf,
    id: Option<String>,
    name: Option<String>,
    chunk_size: usize,
    channel: String,
) -> Result<()> {
    let data = std::fs::read(&file)?;
    let id = match id {
        Some(id) => id,
        None => digest_file(&file)?.chars().take(12).collect(),
    };
    let name = match name {
        Some(n) => n,
        None => default_name(&file)?,
    };

    let chunks = chunk_messages(&id, &name, &data, chunk_size);
    for c in &chunks {
        println!("{}", line(&channel, &codec::encode(c)?));
    }
    eprintln!(
        "split: {} bytes into {} chunk(s) as {}",
        data.len(),
        chunks.len(),
        FileKey::new(&id, &name)
    );
    Ok(())
}

pub fn handle_notify(message: String, address: i64, channel: String) -> Result<()> {
    let msg = NotificationMessage::new(address, message);
    println!("{}", line(&channel, &codec::encode(&msg)?));
    Ok(())
}

pub fn handle_decode(payload: String, kind: PayloadKind) -> Result<()> {
    match kind {
        PayloadKind::Chunk => {
            let c = codec::decode_chunk(payload.as_bytes())?;
            println!(
                "chunk key={} current={} total={} bytes={}",
                c.key(),
                c.current,
                c.total,
                c.content.len()
            );
        }
        PayloadKind::Notification => {
            let n = codec::decode_notification(payload.as_bytes())?;
            println!(
                "notification address={} message={:?} value={:?} created={}",
                n.address, n.message, n.value, n.created
            );
        }
    }
    Ok(())
}

pub fn handle_records(data_dir: PathBuf, table: Table) -> Result<()> {
    match table {
        Table::Messages => {
            let rows = read_messages(&data_dir)?;
            for r in &rows {
                println!(
                    "{:<6} {}  {:?}  {:?}",
                    r.address, r.created, r.message, r.value
                );
            }
            eprintln!("records: {} message(s)", rows.len());
        }
        Table::Faces => {
            let rows = read_faces(&data_dir)?;
            for r in &rows {
                println!(
                    "device={} age={}-{} gender={}({:.1}) smile={}({:.1}) emotions={} created={}",
                    r.device,
                    r.min_age,
                    r.max_age,
                    r.gender,
                    r.gender_conf,
                    r.smile,
                    r.smile_conf,
                    r.emotions,
                    r.created
                );
            }
            eprintln!("records: {} face(s)", rows.len());
        }
    }
    Ok(())
}

/// Regular files directly under `dir`, sorted by name.
fn assembled_files(dir: &Path) -> Result<Vec<(String, u64, String)>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| RelayError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let len = entry
            .metadata()
            .map_err(|e| RelayError::Io(e.into()))?
            .len();
        let name = entry.file_name().to_string_lossy().into_owned();
        out.push((name, len, digest_file(entry.path())?));
    }
    Ok(out)
}

pub fn handle_files(assembly_dir: PathBuf) -> Result<()> {
    let files = assembled_files(&assembly_dir)?;
    for (name, len, digest) in &files {
        println!("{len:>10}  {digest}  {name}");
    }
    eprintln!("files: {} assembled", files.len());
    Ok(())
}
