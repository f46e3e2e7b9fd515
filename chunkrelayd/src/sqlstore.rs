//! [`MetadataStore`] on a local libsql database: one table per record kind,
//! one column per field.
use std::path::Path;

use chunkrelay_core::codec::cbor;
use chunkrelay_core::{FaceRecord, MetadataRecord, MetadataStore, RelayError, Result};
use libsql::{Builder, Connection, Database, Row, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::runtime::Handle;

pub const DATABASE_FILE: &str = "relay.db";

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS metadata (
        address INTEGER NOT NULL,
        message TEXT NOT NULL,
        value BLOB NOT NULL,
        created TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS faces (
        device INTEGER NOT NULL,
        max_age REAL NOT NULL,
        min_age REAL NOT NULL,
        gender TEXT NOT NULL,
        gender_conf REAL NOT NULL,
        smile INTEGER NOT NULL,
        smile_conf REAL NOT NULL,
        emotions TEXT NOT NULL,
        created TEXT NOT NULL
    )",
];

fn sql_err(e: libsql::Error) -> RelayError {
    RelayError::Store(e.to_string())
}

fn format_time(t: OffsetDateTime) -> Result<String> {
    t.format(&Rfc3339)
        .map_err(|e| RelayError::Store(format!("timestamp: {e}")))
}

fn parse_time(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| RelayError::Store(format!("timestamp: {e}")))
}

pub struct SqlStore {
    _db: Database,
    conn: Connection,
    rt: Handle,
}

impl SqlStore {
    /// Open (or create) `relay.db` under `dir`. Must be called inside the
    /// runtime whose handle later serves the blocking trait calls.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db = Builder::new_local(dir.join(DATABASE_FILE))
            .build()
            .await
            .map_err(sql_err)?;
        let conn = db.connect().map_err(sql_err)?;
        for stmt in SCHEMA {
            conn.execute(stmt, ()).await.map_err(sql_err)?;
        }
        Ok(Self {
            _db: db,
            conn,
            rt: Handle::current(),
        })
    }

    pub async fn insert_message(&self, rec: &MetadataRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO metadata (address, message, value, created) VALUES (?1, ?2, ?3, ?4)",
                params![
                    rec.address,
                    rec.message.clone(),
                    cbor::to_vec(&rec.value)?,
                    format_time(rec.created)?
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    pub async fn insert_face(&self, rec: &FaceRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO faces (device, max_age, min_age, gender, gender_conf, smile, smile_conf, emotions, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    rec.device,
                    rec.max_age,
                    rec.min_age,
                    rec.gender.clone(),
                    rec.gender_conf,
                    i64::from(rec.smile),
                    rec.smile_conf,
                    rec.emotions.clone(),
                    format_time(rec.created)?
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    pub async fn messages(&self) -> Result<Vec<MetadataRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT address, message, value, created FROM metadata ORDER BY rowid",
                (),
            )
            .await
            .map_err(sql_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            out.push(message_row(&row)?);
        }
        Ok(out)
    }

    pub async fn faces(&self) -> Result<Vec<FaceRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT device, max_age, min_age, gender, gender_conf, smile, smile_conf, emotions, created
                 FROM faces ORDER BY rowid",
                (),
            )
            .await
            .map_err(sql_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            out.push(face_row(&row)?);
        }
        Ok(out)
    }
}

fn message_row(row: &Row) -> Result<MetadataRecord> {
    let value: Vec<u8> = row.get(2).map_err(sql_err)?;
    let created: String = row.get(3).map_err(sql_err)?;
    Ok(MetadataRecord {
        address: row.get(0).map_err(sql_err)?,
        message: row.get(1).map_err(sql_err)?,
        value: cbor::from_slice(&value)?,
        created: parse_time(&created)?,
    })
}

fn face_row(row: &Row) -> Result<FaceRecord> {
    let smile: i64 = row.get(5).map_err(sql_err)?;
    let created: String = row.get(8).map_err(sql_err)?;
    Ok(FaceRecord {
        device: row.get(0).map_err(sql_err)?,
        max_age: row.get(1).map_err(sql_err)?,
        min_age: row.get(2).map_err(sql_err)?,
        gender: row.get(3).map_err(sql_err)?,
        gender_conf: row.get(4).map_err(sql_err)?,
        smile: smile != 0,
        smile_conf: row.get(6).map_err(sql_err)?,
        emotions: row.get(7).map_err(sql_err)?,
        created: parse_time(&created)?,
    })
}

// The trait is called from blocking threads (`spawn_blocking`), where the
// runtime handle may block on the async driver.
impl MetadataStore for SqlStore {
    fn save_message(&self, rec: &MetadataRecord) -> Result<()> {
        self.rt.block_on(self.insert_message(rec))
    }

    fn save_face(&self, rec: &FaceRecord) -> Result<()> {
        self.rt.block_on(self.insert_face(rec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;

    fn message() -> MetadataRecord {
        MetadataRecord {
            address: 77,
            message: "hello there".into(),
            value: ciborium::Value::Array(vec![
                ciborium::Value::Integer(1.into()),
                ciborium::Value::Text("two".into()),
            ]),
            created: datetime!(2024-05-05 10:20:30.5 UTC),
        }
    }

    fn face() -> FaceRecord {
        FaceRecord {
            device: 2,
            max_age: 38.0,
            min_age: 30.0,
            gender: "Male".into(),
            gender_conf: 97.25,
            smile: true,
            smile_conf: 80.5,
            emotions: "HAPPY,CALM".into(),
            created: datetime!(2024-05-05 10:20:31 UTC),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rows_round_trip_through_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqlStore::open(dir.path()).await.unwrap());

        let s = Arc::clone(&store);
        tokio::task::spawn_blocking(move || {
            s.save_message(&message())?;
            s.save_face(&face())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(store.messages().await.unwrap(), vec![message()]);
        assert_eq!(store.faces().await.unwrap(), vec![face()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reopening_keeps_earlier_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqlStore::open(dir.path()).await.unwrap();
            store.insert_message(&message()).await.unwrap();
        }
        let store = SqlStore::open(dir.path()).await.unwrap();
        let mut second = message();
        second.address = 78;
        store.insert_message(&second).await.unwrap();

        let rows = store.messages().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].address, 77);
        assert_eq!(rows[1].address, 78);
        assert!(dir.path().join(DATABASE_FILE).exists());
    }
}
