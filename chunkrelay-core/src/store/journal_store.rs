use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::journal::{Journal, read_table};
use super::{FaceRecord, MetadataRecord, MetadataStore};
use crate::error::{RelayError, Result};

pub const MESSAGES_TABLE: &str = "messages.tbl";
pub const FACES_TABLE: &str = "faces.tbl";

/// [`MetadataStore`] backed by one journal file per table in `dir`.
pub struct JournalStore {
    dir: PathBuf,
    messages: Mutex<Journal<MetadataRecord>>,
    faces: Mutex<Journal<FaceRecord>>,
}

impl JournalStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            messages: Mutex::new(Journal::open(&dir.join(MESSAGES_TABLE))?),
            faces: Mutex::new(Journal::open(&dir.join(FACES_TABLE))?),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn messages(&self) -> Result<Vec<MetadataRecord>> {
        read_messages(&self.dir)
    }

    pub fn faces(&self) -> Result<Vec<FaceRecord>> {
        read_faces(&self.dir)
    }
}

pub fn read_messages(dir: &Path) -> Result<Vec<MetadataRecord>> {
    read_table::<MetadataRecord>(&dir.join(MESSAGES_TABLE))?.collect()
}

pub fn read_faces(dir: &Path) -> Result<Vec<FaceRecord>> {
    read_table::<FaceRecord>(&dir.join(FACES_TABLE))?.collect()
}

impl MetadataStore for JournalStore {
    fn save_message(&self, rec: &MetadataRecord) -> Result<()> {
        self.messages
            .lock()
            .map_err(|e| RelayError::Store(e.to_string()))?
            .append(rec)
    }

    fn save_face(&self, rec: &FaceRecord) -> Result<()> {
        self.faces
            .lock()
            .map_err(|e| RelayError::Store(e.to_string()))?
            .append(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotificationMessage;
    use time::macros::datetime;

    #[test]
    fn tables_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(&dir.path().join("data")).unwrap();

        let mut n = NotificationMessage::new(7, "hello");
        n.created = datetime!(2024-05-05 10:00 UTC);
        store.save_message(&MetadataRecord::from(&n)).unwrap();

        let face = FaceRecord {
            device: 1,
            max_age: 40.0,
            min_age: 30.0,
            gender: "Male".into(),
            gender_conf: 90.0,
            smile: false,
            smile_conf: 70.0,
            emotions: "CALM".into(),
            created: datetime!(2024-05-05 10:01 UTC),
        };
        store.save_face(&face).unwrap();

        let msgs = store.messages().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].address, 7);
        assert_eq!(msgs[0].message, "hello");
        assert_eq!(msgs[0].created, n.created);
        assert_eq!(store.faces().unwrap(), vec![face]);
    }
}
