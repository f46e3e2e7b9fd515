use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::FileKey;
use crate::error::Result;
use crate::util::sanitize::file_component;

/// Append-only store of files being reassembled, one file per key under
/// `root`.
///
/// Every append opens the file, writes, syncs data and closes again, so no
/// handle outlives the call that produced it.
#[derive(Clone, Debug)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &FileKey) -> Result<PathBuf> {
        file_component(&key.id)?;
        file_component(&key.name)?;
        Ok(self.root.join(key.to_string()))
    }

    /// Returns once the bytes are on disk.
    pub fn append(&self, key: &FileKey, bytes: &[u8]) -> Result<u64> {
        let path = self.path_for(key)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        f.write_all(bytes)?;
        f.sync_data()?;
        Ok(bytes.len() as u64)
    }

    /// blake3 of the assembled file, hex encoded.
    pub fn digest(&self, key: &FileKey) -> Result<String> {
        digest_file(&self.path_for(key)?)
    }
}

pub fn digest_file(path: &Path) -> Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut f, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    #[test]
    fn appends_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(dir.path()).unwrap();
        let key = FileKey::new("a", "f.jpg");
        assert_eq!(sink.append(&key, b"AB").unwrap(), 2);
        sink.append(&key, b"CD").unwrap();
        let path = dir.path().join("a-f.jpg");
        assert_eq!(sink.path_for(&key).unwrap(), path);
        assert_eq!(fs::read(&path).unwrap(), b"ABCD");
        assert_eq!(path.file_name().unwrap().to_str(), Some(key.to_string().as_str()));
        assert_eq!(
            sink.digest(&key).unwrap(),
            blake3::hash(b"ABCD").to_hex().to_string()
        );
    }

    #[test]
    fn keys_do_not_share_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(dir.path().join("nested")).unwrap();
        sink.append(&FileKey::new("a", "f.jpg"), b"1").unwrap();
        sink.append(&FileKey::new("b", "f.jpg"), b"2").unwrap();
        assert_eq!(fs::read(sink.root().join("a-f.jpg")).unwrap(), b"1");
        assert_eq!(fs::read(sink.root().join("b-f.jpg")).unwrap(), b"2");
    }

    #[test]
    fn escaping_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(dir.path()).unwrap();
        let err = sink
            .append(&FileKey::new("a", "../../etc/passwd"), b"x")
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidName(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(dir.path()).unwrap();
        let key = FileKey::new("a", "f.jpg");
        // a directory where the file should be makes the open fail
        fs::create_dir(dir.path().join("a-f.jpg")).unwrap();
        assert!(matches!(sink.append(&key, b"AB"), Err(RelayError::Io(_))));
    }
}
