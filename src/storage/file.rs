use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::identity::{gen_session_id, is_well_formed_id, SessionRecord, SessionStore, SessionStoreError};

/// Session store keeping one JSON document per session under a directory.
///
/// Records are replaced by writing a uniquely named temp file and renaming it over
/// the live file, so readers only ever see a complete record. Writers for the same
/// id are additionally serialised through a per-id async mutex.
pub struct FileSessionStore {
    dir: PathBuf,
    idle: Duration,
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileSessionStore {
    pub fn open(dir: impl Into<PathBuf>, idle: Duration) -> Result<Self, SessionStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, idle, locks: parking_lot::Mutex::new(HashMap::new()) })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub(crate) fn path_for(&self, id: &str) -> PathBuf { self.dir.join(format!("{}.json", id)) }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(id.to_string()).or_default().clone()
    }

    /// Drop the table entry once no other operation holds or waits on it.
    fn release_lock(&self, id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock();
        if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn lock_table_len(&self) -> usize { self.locks.lock().len() }

    async fn write_atomic(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| SessionStoreError::Encode(e.to_string()))?;
        let tmp = self.dir.join(format!(".{}.{}.tmp", record.id, uuid::Uuid::new_v4().simple()));
        let written = async {
            let mut f = tokio::fs::File::create(&tmp).await?;
            f.write_all(&bytes).await?;
            f.sync_all().await?;
            drop(f);
            tokio::fs::rename(&tmp, self.path_for(&record.id)).await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_record(&self, id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: SessionRecord = serde_json::from_slice(&bytes)
            .map_err(|e| SessionStoreError::Corrupt { id: id.to_string(), reason: e.to_string() })?;
        if record.id != id {
            return Err(SessionStoreError::Corrupt { id: id.to_string(), reason: format!("file holds session {}", record.id) });
        }
        Ok(Some(record))
    }

    async fn remove_file(&self, id: &str) -> Result<bool, SessionStoreError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_locked(&self, id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let Some(mut record) = self.read_record(id).await? else { return Ok(None); };
        if record.is_expired(self.idle, Utc::now()) {
            self.remove_file(id).await?;
            return Ok(None);
        }
        record.touch();
        self.write_atomic(&record).await?;
        Ok(Some(record))
    }

    /// Remove the record if it is expired or unreadable; true when a file went away.
    async fn reap_locked(&self, id: &str, now: DateTime<Utc>) -> Result<bool, SessionStoreError> {
        let drop_it = match self.read_record(id).await {
            Ok(Some(r)) => r.is_expired(self.idle, now),
            Ok(None) => false,
            Err(SessionStoreError::Corrupt { reason, .. }) => {
                warn!(target: "session", "removing unreadable session file {}: {}", id, reason);
                true
            }
            Err(e) => return Err(e),
        };
        if !drop_it { return Ok(false); }
        self.remove_file(id).await
    }

    /// Ids of every live record file, skipping temp files.
    async fn list_ids(&self) -> Result<Vec<String>, SessionStoreError> {
        let mut out = Vec::new();
        let mut rd = tokio::fs::read_dir(&self.dir).await?;
        while let Some(ent) = rd.next_entry().await? {
            let name = ent.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                if is_well_formed_id(id) { out.push(id.to_string()); }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self) -> Result<SessionRecord, SessionStoreError> {
        loop {
            let record = SessionRecord::new(gen_session_id()?);
            if tokio::fs::try_exists(self.path_for(&record.id)).await? { continue; }
            let lock = self.lock_for(&record.id);
            let written = {
                let _held = lock.lock().await;
                self.write_atomic(&record).await
            };
            self.release_lock(&record.id, lock);
            written?;
            return Ok(record);
        }
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        if !is_well_formed_id(id) { return Ok(None); }
        let lock = self.lock_for(id);
        let loaded = {
            let _held = lock.lock().await;
            self.load_locked(id).await
        };
        self.release_lock(id, lock);
        loaded
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        if !is_well_formed_id(&record.id) { return Err(SessionStoreError::InvalidId); }
        let lock = self.lock_for(&record.id);
        let written = {
            let _held = lock.lock().await;
            self.write_atomic(record).await
        };
        self.release_lock(&record.id, lock);
        written
    }

    async fn delete(&self, id: &str) -> Result<(), SessionStoreError> {
        if !is_well_formed_id(id) { return Ok(()); }
        let lock = self.lock_for(id);
        let removed = {
            let _held = lock.lock().await;
            self.remove_file(id).await
        };
        self.release_lock(id, lock);
        removed.map(|_| ())
    }

    async fn reap_expired(&self) -> Result<usize, SessionStoreError> {
        let now = Utc::now();
        let mut removed = 0usize;
        for id in self.list_ids().await? {
            let lock = self.lock_for(&id);
            let reaped = {
                let _held = lock.lock().await;
                self.reap_locked(&id, now).await
            };
            self.release_lock(&id, lock);
            if reaped? { removed += 1; }
        }
        Ok(removed)
    }
}
