//! Session persistence backends.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::identity::{SessionStore, SessionStoreError};

mod memory;
mod file;

pub use memory::MemorySessionStore;
pub use file::FileSessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    File,
    Memory,
}

impl FromStr for SessionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SessionBackend::File),
            "memory" | "mem" => Ok(SessionBackend::Memory),
            other => Err(format!("unknown session backend '{}' (expected 'file' or 'memory')", other)),
        }
    }
}

/// Open the configured backend. `dir` is only used by the file backend.
pub fn open_session_store(backend: SessionBackend, dir: &Path, idle: Duration) -> Result<Arc<dyn SessionStore>, SessionStoreError> {
    Ok(match backend {
        SessionBackend::File => Arc::new(FileSessionStore::open(dir, idle)?),
        SessionBackend::Memory => Arc::new(MemorySessionStore::new(idle)),
    })
}
