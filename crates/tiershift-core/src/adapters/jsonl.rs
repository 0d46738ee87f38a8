//! JSON-lines audit store
//!
//! One serialized [`AuditRecord`] per line, opened in append mode. Appends
//! from concurrent verifications are serialized through an async mutex so
//! lines never interleave.

use crate::error::PersistenceError;
use crate::ports::AuditStore;
use crate::types::AuditRecord;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only audit log on the local filesystem
#[derive(Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditStore {
    /// Open (or create) the log at `path`
    ///
    /// # Errors
    /// `PersistenceError::Io` if the file cannot be opened for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Log location
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the log
    ///
    /// # Errors
    /// I/O failures, or a line that is not a valid record.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, PersistenceError> {
        let contents = tokio::fs::read_to_string(path).await?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| PersistenceError::Encode(e.to_string()))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), PersistenceError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| PersistenceError::Encode(e.to_string()))?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Tier, VolumeDescriptor, VolumeId, VolumeState};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn record(id: &str) -> AuditRecord {
        let volume = VolumeDescriptor {
            volume_id: VolumeId::new(id),
            volume_type: Tier::new("gp3"),
            size_gib: 30,
            availability_zone: "az-1".to_string(),
            state: VolumeState::Available,
            tags: BTreeMap::new(),
            attachments: Vec::new(),
            modification: None,
        };
        AuditRecord::observe(&volume, "ap-south-1", Utc::now())
    }

    #[tokio::test]
    async fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let first = record("vol-1");
        JsonlAuditStore::open(&path).await.unwrap().append(&first).await.unwrap();

        let second = record("vol-1");
        JsonlAuditStore::open(&path).await.unwrap().append(&second).await.unwrap();

        let records = JsonlAuditStore::read_all(&path).await.unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(JsonlAuditStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(&record(&format!("vol-{i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let records = JsonlAuditStore::read_all(&path).await.unwrap();
        assert_eq!(records.len(), 20);
    }

    #[tokio::test]
    async fn corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        tokio::fs::write(&path, "not json\n").await.unwrap();

        let result = JsonlAuditStore::read_all(&path).await;
        assert!(matches!(result, Err(PersistenceError::Encode(_))));
    }
}
