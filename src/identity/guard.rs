//! Per-request access guard.
//!
//! Resolves the presented session into a [`RequestContext`] and drives the
//! login/logout transitions. Every failure while resolving lands in the
//! anonymous state; the guard never fails open.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::tprintln;

use super::request_context::RequestContext;
use super::serializer::PrincipalSerializer;
use super::session::{SessionRecord, SessionStore};
use super::verifier::{AuthOutcome, IdentityVerifier};

pub const MISSING_CREDENTIALS: &str = "Missing credentials.";

/// A resolved request: its context plus the session record backing it.
#[derive(Debug, Clone)]
pub struct GuardedRequest {
    pub context: RequestContext,
    record: SessionRecord,
    issued: bool,
}

impl GuardedRequest {
    pub fn record(&self) -> &SessionRecord { &self.record }

    pub fn session_id(&self) -> &str { &self.record.id }

    /// True when the client has not seen the current session id yet.
    pub fn needs_cookie(&self) -> bool { self.issued }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    Rejected(String),
}

pub struct AccessGuard {
    store: Arc<dyn SessionStore>,
    serializer: PrincipalSerializer,
    verifier: Arc<dyn IdentityVerifier>,
    rotate_on_login: bool,
}

impl AccessGuard {
    pub fn new(store: Arc<dyn SessionStore>, serializer: PrincipalSerializer, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { store, serializer, verifier, rotate_on_login: true }
    }

    /// Move the session to a new id on successful login.
    pub fn with_rotate_on_login(mut self, rotate: bool) -> Self {
        self.rotate_on_login = rotate;
        self
    }

    /// Load (or create) the session for `presented` and restore its principal.
    pub async fn resolve(&self, presented: Option<&str>) -> AppResult<GuardedRequest> {
        let existing = match presented {
            Some(sid) => match self.store.load(sid).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(target: "session", "session load failed, issuing a fresh session: {e}");
                    None
                }
            },
            None => None,
        };
        let (record, issued) = match existing {
            Some(r) => (r, false),
            None => {
                let r = self.store.create().await?;
                tprintln!("session.issue sid={}", r.id);
                (r, true)
            }
        };

        let mut context = RequestContext::anonymous(record.id.clone());
        if let Some(pid) = record.principal_id() {
            match self.serializer.deserialize(pid).await {
                Ok(Some(principal)) => context.principal = Some(principal),
                Ok(None) => {
                    debug!(target: "session", request_id = %context.request_id, "stale principal reference, treating request as anonymous");
                }
                Err(e) => {
                    warn!(target: "session", request_id = %context.request_id, "could not restore principal, treating request as anonymous: {e}");
                }
            }
        }
        Ok(GuardedRequest { context, record, issued })
    }

    /// Verify credentials and, on success, bind the principal to the session.
    ///
    /// Nothing is written unless verification succeeded. Directory failures are
    /// returned as errors, never as a rejection.
    pub async fn login(&self, req: &mut GuardedRequest, email: &str, password: &str) -> AppResult<LoginOutcome> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::user("missing_credentials", MISSING_CREDENTIALS));
        }
        let principal = match self.verifier.verify(email, password).await {
            AuthOutcome::Success(p) => p,
            AuthOutcome::InvalidCredentials(message) => return Ok(LoginOutcome::Rejected(message)),
            AuthOutcome::DirectoryError(e) => return Err(e.into()),
        };

        let mut next = if self.rotate_on_login {
            let mut fresh = self.store.create().await?;
            fresh.payload = req.record.payload.clone();
            fresh
        } else {
            req.record.clone()
        };
        next.set_principal_id(self.serializer.serialize(&principal));
        next.touch();
        if let Err(e) = self.store.save(&next).await {
            if next.id != req.record.id {
                if let Err(cleanup) = self.store.delete(&next.id).await {
                    warn!(target: "session", "could not delete unused rotated session: {cleanup}");
                }
            }
            return Err(e.into());
        }

        if next.id != req.record.id {
            if let Err(e) = self.store.delete(&req.record.id).await {
                warn!(target: "session", "could not delete pre-login session: {e}");
            }
            req.issued = true;
        }
        info!(target: "auth", user_id = %principal.id, request_id = %req.context.request_id, "login");
        req.context.session_id = next.id.clone();
        req.context.principal = Some(principal);
        req.record = next;
        Ok(LoginOutcome::Authenticated)
    }

    /// Drop the session and hand the client a fresh, anonymous one.
    pub async fn logout(&self, req: &mut GuardedRequest) -> AppResult<()> {
        self.store.delete(&req.record.id).await?;
        let fresh = self.store.create().await?;
        if let Some(p) = req.context.principal.take() {
            info!(target: "auth", user_id = %p.id, request_id = %req.context.request_id, "logout");
        }
        req.context.session_id = fresh.id.clone();
        req.record = fresh;
        req.issued = true;
        Ok(())
    }
}
