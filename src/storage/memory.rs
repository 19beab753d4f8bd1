use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::identity::{gen_session_id, SessionRecord, SessionStore, SessionStoreError};

/// In-process session store. Not durable across restarts.
pub struct MemorySessionStore {
    idle: Duration,
    map: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new(idle: Duration) -> Self {
        Self { idle, map: RwLock::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self) -> Result<SessionRecord, SessionStoreError> {
        loop {
            let record = SessionRecord::new(gen_session_id()?);
            let mut w = self.map.write();
            if w.contains_key(&record.id) { continue; }
            w.insert(record.id.clone(), record.clone());
            return Ok(record);
        }
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let mut w = self.map.write();
        let expired = match w.get(id) {
            Some(r) => r.is_expired(self.idle, Utc::now()),
            None => return Ok(None),
        };
        if expired {
            w.remove(id);
            return Ok(None);
        }
        Ok(w.get_mut(id).map(|r| {
            r.touch();
            r.clone()
        }))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        self.map.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionStoreError> {
        self.map.write().remove(id);
        Ok(())
    }

    async fn reap_expired(&self) -> Result<usize, SessionStoreError> {
        let now = Utc::now();
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|_, r| !r.is_expired(self.idle, now));
        Ok(before - w.len())
    }
}
