//!
//! passgate HTTP server
//! --------------------
//! Axum routes over the access guard. Every request resolves its session from the
//! `passgate.sid` cookie (issuing a fresh one when absent or expired); login and
//! logout drive the guard's transitions and re-issue the cookie when the session id
//! changes.
//!
//! Routes:
//! - `GET /`, `GET /login`: public pages.
//! - `POST /login`: form-urlencoded or JSON `{email, password}`.
//! - `GET /isauthenticated`: reports the current state without changing it.
//! - `GET /authrequired`: protected; anonymous callers are redirected to `/`.
//! - `POST /logout`: ends the session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::identity::{AccessGuard, DirectoryHandle, DirectoryVerifier, GuardedRequest, HttpUserDirectory, LoginOutcome, PrincipalSerializer, SessionStore};
use crate::storage::open_session_store;

pub const SESSION_COOKIE: &str = "passgate.sid";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<AccessGuard>,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(guard: AccessGuard, cookie_secure: bool) -> Self {
        Self { guard: Arc::new(guard), cookie_secure }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/isauthenticated", get(is_authenticated))
        .route("/authrequired", get(auth_required))
        .with_state(state)
}

/// Wire up directory, session store and guard from configuration and serve until shutdown.
pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "passgate starting: http_port={}, directory_url='{}', directory_timeout_ms={}, session_backend={:?}, session_dir={:?}, idle_secs={}, rotate_on_login={}",
        cfg.http_port, cfg.directory_url, cfg.directory_timeout.as_millis(), cfg.session_backend,
        cfg.session_dir, cfg.session_idle.as_secs(), cfg.rotate_on_login
    );

    let http_dir = HttpUserDirectory::new(&cfg.directory_url, cfg.directory_timeout)?;
    let directory = DirectoryHandle::new(Arc::new(http_dir), cfg.directory_timeout);
    let store = open_session_store(cfg.session_backend, &cfg.session_dir, cfg.session_idle)
        .with_context(|| format!("While opening session store at {:?}", cfg.session_dir))?;

    if !cfg.session_sweep.is_zero() {
        spawn_reaper(store.clone(), cfg.session_sweep);
    } else {
        info!(target: "startup", "session reaper disabled");
    }

    let guard = AccessGuard::new(
        store,
        PrincipalSerializer::new(directory.clone()),
        Arc::new(DirectoryVerifier::new(directory)),
    )
    .with_rotate_on_login(cfg.rotate_on_login);
    let app = router(AppState::new(guard, cfg.cookie_secure));

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_reaper(store: Arc<dyn SessionStore>, every: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match store.reap_expired().await {
                Ok(0) => {}
                Ok(n) => debug!(target: "session", removed = n, "session_reap"),
                Err(e) => warn!(target: "session", "session reap failed: {e}"),
            }
        }
    });
}

#[derive(Debug, Default, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// Login body as either `application/json` or `application/x-www-form-urlencoded`.
struct LoginForm(LoginPayload);

impl<S> FromRequest<S> for LoginForm
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);
        if is_json {
            let Json(p) = Json::<LoginPayload>::from_request(req, state).await.map_err(IntoResponse::into_response)?;
            Ok(Self(p))
        } else {
            let Form(p) = Form::<LoginPayload>::from_request(req, state).await.map_err(IntoResponse::into_response)?;
            Ok(Self(p))
        }
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all("cookie").iter() {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn session_cookie(sid: &str, secure: bool) -> Option<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Lax; Path=/{}", SESSION_COOKIE, sid, secure)).ok()
}

async fn open_session(state: &AppState, headers: &HeaderMap) -> Result<GuardedRequest, Response> {
    let presented = parse_cookie(headers, SESSION_COOKIE);
    state.guard.resolve(presented.as_deref()).await.map_err(|e| {
        error!(target: "session", "could not establish a session: {e}");
        e.into_response()
    })
}

/// Attach the session cookie when the client has not seen this session id yet.
fn finish(state: &AppState, req: &GuardedRequest, resp: impl IntoResponse) -> Response {
    let mut resp = resp.into_response();
    if req.needs_cookie() {
        if let Some(v) = session_cookie(req.session_id(), state.cookie_secure) {
            resp.headers_mut().append(SET_COOKIE, v);
        }
    }
    resp
}

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let req = match open_session(&state, &headers).await { Ok(r) => r, Err(resp) => return resp };
    finish(&state, &req, "You hit the home page!\n")
}

async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let req = match open_session(&state, &headers).await { Ok(r) => r, Err(resp) => return resp };
    finish(&state, &req, "You got the login page!\n")
}

async fn login(State(state): State<AppState>, headers: HeaderMap, LoginForm(payload): LoginForm) -> Response {
    let mut req = match open_session(&state, &headers).await { Ok(r) => r, Err(resp) => return resp };
    match state.guard.login(&mut req, &payload.email, &payload.password).await {
        Ok(LoginOutcome::Authenticated) => finish(&state, &req, Redirect::to("/authrequired")),
        Ok(LoginOutcome::Rejected(message)) => finish(&state, &req, (StatusCode::UNAUTHORIZED, format!("{}\n", message))),
        Err(e) => {
            if e.is_server_fault() { error!(target: "auth", request_id = %req.context.request_id, "login failed: {e}"); }
            finish(&state, &req, e)
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut req = match open_session(&state, &headers).await { Ok(r) => r, Err(resp) => return resp };
    if let Err(e) = state.guard.logout(&mut req).await {
        error!(target: "session", request_id = %req.context.request_id, "logout failed: {e}");
        return e.into_response();
    }
    finish(&state, &req, Redirect::to("/"))
}

async fn is_authenticated(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let req = match open_session(&state, &headers).await { Ok(r) => r, Err(resp) => return resp };
    let body = if req.context.is_authenticated() { "Authenticated!" } else { "Log in!" };
    finish(&state, &req, body)
}

async fn auth_required(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let req = match open_session(&state, &headers).await { Ok(r) => r, Err(resp) => return resp };
    match req.context.require_principal() {
        Ok(_) => finish(&state, &req, "You hit the authentication endpoint\n"),
        Err(_) => finish(&state, &req, Redirect::to("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cookie_finds_named_value() {
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("theme=dark; passgate.sid=abc123; x=y"));
        assert_eq!(parse_cookie(&h, SESSION_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(parse_cookie(&h, "missing"), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let plain = session_cookie("abc", false).unwrap();
        assert_eq!(plain.to_str().unwrap(), "passgate.sid=abc; HttpOnly; SameSite=Lax; Path=/");
        let secure = session_cookie("abc", true).unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }
}
