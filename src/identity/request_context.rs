use super::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// Unauthenticated access to a protected operation. Handlers turn this into a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDenied;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub principal: Option<Principal>,
    pub request_id: String,
}

impl RequestContext {
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), principal: None, request_id: uuid::Uuid::new_v4().to_string() }
    }

    pub fn is_authenticated(&self) -> bool { self.principal.is_some() }

    pub fn state(&self) -> AuthState {
        if self.is_authenticated() { AuthState::Authenticated } else { AuthState::Anonymous }
    }

    pub fn require_principal(&self) -> Result<&Principal, AccessDenied> {
        self.principal.as_ref().ok_or(AccessDenied)
    }
}
