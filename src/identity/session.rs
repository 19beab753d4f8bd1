use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Payload key holding the serialized principal id.
pub const PRINCIPAL_KEY: &str = "principalId";

pub type SessionId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self { id, payload: Map::new(), created_at: now, last_accessed_at: now }
    }

    pub fn principal_id(&self) -> Option<&str> {
        self.payload.get(PRINCIPAL_KEY).and_then(|v| v.as_str())
    }

    /// Replaces any previously stored principal; a session never carries two.
    pub fn set_principal_id(&mut self, id: impl Into<String>) {
        self.payload.insert(PRINCIPAL_KEY.to_string(), Value::String(id.into()));
    }

    pub fn clear_principal_id(&mut self) -> bool {
        self.payload.remove(PRINCIPAL_KEY).is_some()
    }

    /// Idle expiry measured from the last access.
    pub fn is_expired(&self, idle: Duration, now: DateTime<Utc>) -> bool {
        let idle = TimeDelta::from_std(idle).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.last_accessed_at) >= idle
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session record {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("session record could not be encoded: {0}")]
    Encode(String),
    #[error("malformed session id")]
    InvalidId,
}

/// Durable mapping from session id to session record.
///
/// `save` must be atomic per id: concurrent saves for one id may race (last writer wins)
/// but never leave a torn record behind.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Issue a fresh id with an empty payload, persisted immediately.
    async fn create(&self) -> Result<SessionRecord, SessionStoreError>;
    /// `None` when missing or idle-expired. A hit refreshes `last_accessed_at`.
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionStoreError>;
    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError>;
    /// Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), SessionStoreError>;
    /// Remove every expired record; returns how many were removed.
    async fn reap_expired(&self) -> Result<usize, SessionStoreError>;
}

/// 256-bit random id, base64url without padding.
pub fn gen_session_id() -> Result<SessionId, SessionStoreError> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)
        .map_err(|e| SessionStoreError::Io(std::io::Error::other(e.to_string())))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Shape check for ids arriving from clients. Only base64url ids of the generated length pass.
pub fn is_well_formed_id(id: &str) -> bool {
    id.len() == 43 && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
