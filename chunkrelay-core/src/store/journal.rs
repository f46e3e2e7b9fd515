use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::codec::cbor;
use crate::error::{RelayError, Result};
use crate::util::varint::{get_uvarint, put_uvarint};

const MAGIC: &[u8; 8] = b"CRTABLE\0";
const VERSION: u8 = 1;
const HEADER_LEN: u64 = MAGIC.len() as u64 + 1;
/// Upper bound for one encoded record. Rows are small; anything larger is
/// corruption.
const MAX_RECORD_LEN: u64 = 16 << 20;

/// Append-only table file: header, then length-delimited CBOR records.
pub struct Journal<T> {
    f: File,
    path: PathBuf,
    _rec: PhantomData<fn() -> T>,
}

pub struct JournalIter<T> {
    r: BufReader<File>,
    _rec: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for JournalIter<T> {
    type Item = Result<T>;
    fn next(&mut self) -> Option<Self::Item> {
        match read_next_record(&mut self.r) {
            Ok(Some(raw)) => Some(cbor::from_slice(&raw)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// `Ok(None)` at the end of the table, including a partially written tail.
fn read_next_record<R: Read>(r: &mut R) -> Result<Option<Vec<u8>>> {
    let len = match get_uvarint(r) {
        Ok(Some(n)) => n,
        Ok(None) => return Ok(None),
        Err(RelayError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if len > MAX_RECORD_LEN {
        return Err(RelayError::Journal(format!(
            "record length {len} exceeds {MAX_RECORD_LEN}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    if let Err(e) = r.read_exact(&mut buf) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e.into());
    }
    Ok(Some(buf))
}

fn check_header(f: &mut File) -> Result<()> {
    let mut magic = [0u8; 8];
    f.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(RelayError::Journal("bad table magic".into()));
    }
    let mut ver = [0u8; 1];
    f.read_exact(&mut ver)?;
    if ver[0] != VERSION {
        return Err(RelayError::Journal(format!(
            "unsupported table version {}",
            ver[0]
        )));
    }
    Ok(())
}

impl<T: Serialize + DeserializeOwned> Journal<T> {
    pub fn open(path: &Path) -> Result<Self> {
        let existed = path.exists() && std::fs::metadata(path)?.len() > 0;
        let mut f = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        if !existed {
            f.write_all(MAGIC)?;
            f.write_all(&[VERSION])?;
            f.sync_data()?;
        } else {
            f.seek(SeekFrom::Start(0))?;
            check_header(&mut f)?;
            // Cut a torn tail so later appends stay readable.
            let mut r = BufReader::new(File::open(path)?);
            r.seek(SeekFrom::Start(HEADER_LEN))?;
            let mut valid_end = HEADER_LEN;
            while read_next_record(&mut r)?.is_some() {
                valid_end = r.stream_position()?;
            }
            if valid_end < f.metadata()?.len() {
                f.set_len(valid_end)?;
            }
        }
        Ok(Self {
            f,
            path: path.to_path_buf(),
            _rec: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; it is synced to disk before this returns.
    pub fn append(&mut self, rec: &T) -> Result<()> {
        let plain = cbor::to_vec(rec)?;
        if plain.len() as u64 > MAX_RECORD_LEN {
            return Err(RelayError::Journal(format!(
                "record of {} bytes is too large",
                plain.len()
            )));
        }
        let mut frame = Vec::with_capacity(plain.len() + 10);
        put_uvarint(&mut frame, plain.len() as u64);
        frame.extend_from_slice(&plain);
        self.f.write_all(&frame)?;
        self.f.sync_data()?;
        Ok(())
    }

    /// Iterate over the records on disk with an independent read handle.
    pub fn iter(&self) -> Result<JournalIter<T>> {
        read_table(&self.path)
    }
}

/// Read a table without opening it for writing.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<JournalIter<T>> {
    let mut f = File::open(path)?;
    check_header(&mut f)?;
    Ok(JournalIter {
        r: BufReader::new(f),
        _rec: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Row {
        n: u32,
        s: String,
    }

    fn row(n: u32) -> Row {
        Row {
            n,
            s: format!("row-{n}"),
        }
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let mut j = Journal::<Row>::open(&path).unwrap();
            j.append(&row(1)).unwrap();
            j.append(&row(2)).unwrap();
        }
        let mut j = Journal::<Row>::open(&path).unwrap();
        j.append(&row(3)).unwrap();
        let rows: Vec<Row> = j.iter().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![row(1), row(2), row(3)]);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let mut j = Journal::<Row>::open(&path).unwrap();
            j.append(&row(1)).unwrap();
        }
        // half a record: a length prefix promising more bytes than follow
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0x20, 0xa2, 0x61]).unwrap();
        drop(f);

        let rows: Vec<Row> = read_table(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![row(1)]);

        let mut j = Journal::<Row>::open(&path).unwrap();
        j.append(&row(2)).unwrap();
        let rows: Vec<Row> = j.iter().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![row(1), row(2)]);
    }

    #[test]
    fn absurd_record_length_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let mut j = Journal::<Row>::open(&path).unwrap();
            j.append(&row(1)).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        let mut prefix = Vec::new();
        put_uvarint(&mut prefix, u64::MAX / 2);
        f.write_all(&prefix).unwrap();
        f.write_all(b"junk").unwrap();
        drop(f);

        let mut it = read_table::<Row>(&path).unwrap();
        assert_eq!(it.next().unwrap().unwrap(), row(1));
        assert!(matches!(it.next(), Some(Err(RelayError::Journal(_)))));
        assert!(matches!(
            Journal::<Row>::open(&path),
            Err(RelayError::Journal(_))
        ));
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        std::fs::write(&path, b"definitely not a table").unwrap();
        assert!(matches!(
            Journal::<Row>::open(&path),
            Err(RelayError::Journal(_))
        ));
    }
}
