//! Runtime configuration read from `PASSGATE_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::storage::SessionBackend;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub directory_url: String,
    pub directory_timeout: Duration,
    pub session_backend: SessionBackend,
    pub session_dir: PathBuf,
    pub session_idle: Duration,
    /// Zero disables the background reaper.
    pub session_sweep: Duration,
    pub cookie_secure: bool,
    pub rotate_on_login: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            directory_url: "http://localhost:5000".to_string(),
            directory_timeout: Duration::from_millis(5_000),
            session_backend: SessionBackend::File,
            session_dir: PathBuf::from("sessions"),
            session_idle: Duration::from_secs(60 * 60),
            session_sweep: Duration::from_secs(60 * 60),
            cookie_secure: false,
            rotate_on_login: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Ok(Self {
            http_port: parse_or(&lookup, "PASSGATE_HTTP_PORT", d.http_port)?,
            directory_url: lookup("PASSGATE_DIRECTORY_URL").unwrap_or(d.directory_url),
            directory_timeout: Duration::from_millis(non_zero(parse_or(&lookup, "PASSGATE_DIRECTORY_TIMEOUT_MS", d.directory_timeout.as_millis() as u64)?, "PASSGATE_DIRECTORY_TIMEOUT_MS")?),
            session_backend: match lookup("PASSGATE_SESSION_BACKEND") {
                Some(v) => v.parse().map_err(|e: String| anyhow!(e)).context("PASSGATE_SESSION_BACKEND")?,
                None => d.session_backend,
            },
            session_dir: lookup("PASSGATE_SESSION_DIR").map(PathBuf::from).unwrap_or(d.session_dir),
            session_idle: Duration::from_secs(non_zero(parse_or(&lookup, "PASSGATE_SESSION_IDLE_SECS", d.session_idle.as_secs())?, "PASSGATE_SESSION_IDLE_SECS")?),
            session_sweep: Duration::from_secs(parse_or(&lookup, "PASSGATE_SESSION_SWEEP_SECS", d.session_sweep.as_secs())?),
            cookie_secure: parse_or(&lookup, "PASSGATE_COOKIE_SECURE", d.cookie_secure)?,
            rotate_on_login: parse_or(&lookup, "PASSGATE_ROTATE_ON_LOGIN", d.rotate_on_login)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| anyhow!("invalid value '{}' for {}: {}", raw, key, e)),
        None => Ok(default),
    }
}

/// Durations that must be positive.
fn non_zero(v: u64, key: &str) -> Result<u64> {
    if v == 0 { bail!("{} must be greater than zero", key); }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.http_port, 3000);
        assert_eq!(cfg.directory_url, "http://localhost:5000");
        assert_eq!(cfg.session_backend, SessionBackend::File);
        assert!(cfg.rotate_on_login);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("PASSGATE_HTTP_PORT", "8080"),
            ("PASSGATE_SESSION_BACKEND", "memory"),
            ("PASSGATE_SESSION_IDLE_SECS", "90"),
            ("PASSGATE_DIRECTORY_TIMEOUT_MS", "250"),
            ("PASSGATE_COOKIE_SECURE", "true"),
        ])).unwrap();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.session_backend, SessionBackend::Memory);
        assert_eq!(cfg.session_idle, Duration::from_secs(90));
        assert_eq!(cfg.directory_timeout, Duration::from_millis(250));
        assert!(cfg.cookie_secure);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = ServerConfig::from_lookup(lookup_from(&[("PASSGATE_HTTP_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PASSGATE_HTTP_PORT"));
        let err = ServerConfig::from_lookup(lookup_from(&[("PASSGATE_SESSION_BACKEND", "redis")])).unwrap_err();
        assert!(format!("{:#}", err).contains("PASSGATE_SESSION_BACKEND"));
        let err = ServerConfig::from_lookup(lookup_from(&[("PASSGATE_SESSION_IDLE_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("PASSGATE_SESSION_IDLE_SECS"));
        let err = ServerConfig::from_lookup(lookup_from(&[("PASSGATE_DIRECTORY_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(err.to_string().contains("PASSGATE_DIRECTORY_TIMEOUT_MS"));
    }

    #[test]
    fn sweep_may_be_disabled() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[("PASSGATE_SESSION_SWEEP_SECS", "0")])).unwrap();
        assert!(cfg.session_sweep.is_zero());
    }

    #[tokio::test]
    async fn configured_idle_window_keeps_new_sessions_resolvable() {
        use crate::identity::SessionStore;
        use crate::storage::MemorySessionStore;

        let cfg = ServerConfig::from_lookup(lookup_from(&[("PASSGATE_SESSION_IDLE_SECS", "1")])).unwrap();
        let store = MemorySessionStore::new(cfg.session_idle);
        let rec = store.create().await.unwrap();
        assert!(store.load(&rec.id).await.unwrap().is_some());
    }
}
