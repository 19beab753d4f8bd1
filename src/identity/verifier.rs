use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::directory::{DirectoryError, DirectoryHandle};
use super::principal::Principal;

/// Rejection text shared by the unknown-email and wrong-password paths.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials.";

#[derive(Debug)]
pub enum AuthOutcome {
    Success(Principal),
    InvalidCredentials(String),
    DirectoryError(DirectoryError),
}

impl AuthOutcome {
    fn rejected() -> Self { AuthOutcome::InvalidCredentials(INVALID_CREDENTIALS.to_string()) }

    pub fn is_success(&self) -> bool { matches!(self, AuthOutcome::Success(_)) }
}

/// Pluggable authentication strategy.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> AuthOutcome;
}

/// Constant-time check of a plaintext password against a stored hash.
pub trait PasswordCheck: Send + Sync {
    fn check(&self, plaintext: &str, hash: &str) -> bool;
}

/// Argon2 PHC verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Check;

impl PasswordCheck for Argon2Check {
    fn check(&self, plaintext: &str, hash: &str) -> bool {
        crate::security::verify_password(hash, plaintext)
    }
}

/// Email/password strategy: directory lookup by email, then hash check.
pub struct DirectoryVerifier {
    directory: DirectoryHandle,
    hasher: Arc<dyn PasswordCheck>,
}

impl DirectoryVerifier {
    pub fn new(directory: DirectoryHandle) -> Self {
        Self { directory, hasher: Arc::new(Argon2Check) }
    }

    pub fn with_hasher(directory: DirectoryHandle, hasher: Arc<dyn PasswordCheck>) -> Self {
        Self { directory, hasher }
    }
}

#[async_trait]
impl IdentityVerifier for DirectoryVerifier {
    async fn verify(&self, email: &str, password: &str) -> AuthOutcome {
        let record = match self.directory.find_by_email(email).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!(target: "auth", "login rejected: no directory record");
                return AuthOutcome::rejected();
            }
            Err(e) => {
                error!(target: "auth", "directory lookup by email failed: {e}");
                return AuthOutcome::DirectoryError(e);
            }
        };

        // Hashing is CPU bound; keep it off the async workers.
        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let hash = record.password_hash.clone();
        let matched = match tokio::task::spawn_blocking(move || hasher.check(&plaintext, &hash)).await {
            Ok(m) => m,
            Err(e) => {
                error!(target: "auth", "password check task failed: {e}");
                false
            }
        };
        if !matched {
            info!(target: "auth", user_id = %record.id, "login rejected: password mismatch");
            return AuthOutcome::rejected();
        }
        info!(target: "auth", user_id = %record.id, "credentials verified");
        AuthOutcome::Success(record)
    }
}
