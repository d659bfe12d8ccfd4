//! Directory-backed outbox storage.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{OutboxError, OutboxRecord};

const RECORD_EXTENSION: &str = "json";

/// Outbox records stored as `<id>.json` files in one directory.
///
/// Each write goes to a temporary file first and is renamed into place, so
/// a crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct Outbox {
    dir: PathBuf,
}

impl Outbox {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, OutboxError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    async fn write(&self, record: &OutboxRecord) -> Result<(), OutboxError> {
        let path = self.record_path(record.id);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(record)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Persist a new record for `topic`/`key`.
    pub async fn enqueue(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<OutboxRecord, OutboxError> {
        let record = OutboxRecord::new(topic, key, payload);
        self.write(&record).await?;
        debug!(id = %record.id, topic = %topic, key = %key, "Outbox record stored");
        Ok(record)
    }

    /// All stored records, oldest first. Unreadable files are skipped.
    pub async fn pending(&self) -> Result<Vec<OutboxRecord>, OutboxError> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<OutboxRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable outbox record");
                }
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Record a failed publish attempt.
    pub async fn mark_attempt_failed(
        &self,
        record: &OutboxRecord,
        error: &str,
    ) -> Result<OutboxRecord, OutboxError> {
        let mut updated = record.clone();
        updated.attempts += 1;
        updated.last_error = Some(error.to_string());
        self.write(&updated).await?;
        Ok(updated)
    }

    /// Delete a record once it was published. Missing records are ignored.
    pub async fn remove(&self, id: Uuid) -> Result<(), OutboxError> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn len(&self) -> Result<usize, OutboxError> {
        Ok(self.pending().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, OutboxError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_enqueue_and_pending() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::open(dir.path().join("outbox")).await.unwrap();

        let first = outbox.enqueue("requests", "c1", "{}".to_string()).await.unwrap();
        let second = outbox.enqueue("requests", "c2", "{}".to_string()).await.unwrap();

        let pending = outbox.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&first));
        assert!(pending.contains(&second));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = {
            let outbox = Outbox::open(dir.path()).await.unwrap();
            outbox.enqueue("requests", "c1", r#"{"objectId":"c1"}"#.to_string()).await.unwrap()
        };

        let reopened = Outbox::open(dir.path()).await.unwrap();
        assert_eq!(reopened.pending().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_mark_failed_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::open(dir.path()).await.unwrap();
        let record = outbox.enqueue("requests", "c1", "{}".to_string()).await.unwrap();

        let updated = outbox.mark_attempt_failed(&record, "broker down").await.unwrap();
        assert_eq!(updated.attempts, 1);
        assert_eq!(outbox.pending().await.unwrap()[0].last_error.as_deref(), Some("broker down"));

        outbox.remove(record.id).await.unwrap();
        outbox.remove(record.id).await.unwrap();
        assert!(outbox.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::open(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("garbage.json"), b"not json").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"ignored").await.unwrap();

        assert!(outbox.pending().await.unwrap().is_empty());
    }
}
