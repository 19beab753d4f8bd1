use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{StatusCode, Url};
use thiserror::Error;

use super::principal::Principal;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory did not answer within {0:?}")]
    Timeout(Duration),
    #[error("user directory unreachable: {0}")]
    Transport(String),
    #[error("user directory returned HTTP {0}")]
    Status(u16),
    #[error("user directory returned an undecodable record: {0}")]
    Decode(String),
}

/// Read-only view of the service of record for users.
/// `Ok(None)` means the directory answered and has no such user.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, DirectoryError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError>;
}

/// Shared directory handle that bounds every lookup with a deadline.
#[derive(Clone)]
pub struct DirectoryHandle {
    inner: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl DirectoryHandle {
    pub fn new(inner: Arc<dyn UserDirectory>, timeout: Duration) -> Self { Self { inner, timeout } }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, DirectoryError> {
        self.bounded(self.inner.find_by_email(email)).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        self.bounded(self.inner.find_by_id(id)).await
    }

    async fn bounded<F>(&self, fut: F) -> Result<Option<Principal>, DirectoryError>
    where
        F: Future<Output = Result<Option<Principal>, DirectoryError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(DirectoryError::Timeout(self.timeout)),
        }
    }
}

/// Directory reached over HTTP, JSON-server style:
/// `GET {base}/users?email=..` returns an array, `GET {base}/users/{id}` a record or 404.
pub struct HttpUserDirectory {
    base: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpUserDirectory {
    pub fn new(base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let parsed = Url::parse(base).with_context(|| format!("invalid directory URL: {}", base))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building directory HTTP client")?;
        let base = parsed.as_str().trim_end_matches('/').to_string();
        Ok(Self { base, client, timeout })
    }

    fn map_send_error(&self, e: reqwest::Error) -> DirectoryError {
        if e.is_timeout() { DirectoryError::Timeout(self.timeout) } else { DirectoryError::Transport(e.to_string()) }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, DirectoryError> {
        let url = format!("{}/users?email={}", self.base, urlencoding::encode(email));
        let resp = self.client.get(url).send().await.map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        let users: Vec<Principal> = resp.json().await.map_err(|e| {
            if e.is_timeout() { DirectoryError::Timeout(self.timeout) } else { DirectoryError::Decode(e.to_string()) }
        })?;
        Ok(users.into_iter().next())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        let url = format!("{}/users/{}", self.base, urlencoding::encode(id));
        let resp = self.client.get(url).send().await.map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND { return Ok(None); }
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        let user: Principal = resp.json().await.map_err(|e| {
            if e.is_timeout() { DirectoryError::Timeout(self.timeout) } else { DirectoryError::Decode(e.to_string()) }
        })?;
        Ok(Some(user))
    }
}

/// In-process directory keyed by principal id.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, Principal>>,
}

impl MemoryDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, principal: Principal) {
        self.users.write().insert(principal.id.clone(), principal);
    }

    pub fn remove(&self, id: &str) -> Option<Principal> { self.users.write().remove(id) }

    pub fn len(&self) -> usize { self.users.read().len() }

    pub fn is_empty(&self) -> bool { self.users.read().is_empty() }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, DirectoryError> {
        Ok(self.users.read().values().find(|p| p.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        Ok(self.users.read().get(id).cloned())
    }
}
