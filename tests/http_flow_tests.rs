//! End-to-end HTTP flows through the router: login, protected access, logout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use passgate::identity::{
    AccessGuard, DirectoryError, DirectoryHandle, DirectoryVerifier, MemoryDirectory, Principal, PrincipalSerializer,
    UserDirectory,
};
use passgate::security::hash_password;
use passgate::server::{router, AppState, SESSION_COOKIE};
use passgate::storage::MemorySessionStore;

fn app_with(directory: Arc<dyn UserDirectory>) -> Router {
    let handle = DirectoryHandle::new(directory, Duration::from_secs(2));
    let guard = AccessGuard::new(
        Arc::new(MemorySessionStore::new(Duration::from_secs(600))),
        PrincipalSerializer::new(handle.clone()),
        Arc::new(DirectoryVerifier::new(handle)),
    );
    router(AppState::new(guard, false))
}

fn app() -> Router {
    let dir = MemoryDirectory::new();
    dir.insert(Principal::new("1", "a@b.com", hash_password("correct").expect("hash")));
    app_with(Arc::new(dir))
}

struct DownDirectory;

#[async_trait]
impl UserDirectory for DownDirectory {
    async fn find_by_email(&self, _email: &str) -> Result<Option<Principal>, DirectoryError> {
        Err(DirectoryError::Status(503))
    }

    async fn find_by_id(&self, _id: &str) -> Result<Option<Principal>, DirectoryError> {
        Err(DirectoryError::Status(503))
    }
}

fn issued_cookie(resp: &Response) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|s| s.split(';').next().and_then(|nv| nv.strip_prefix(prefix.as_str())).map(str::to_string))
}

fn location(resp: &Response) -> Option<String> {
    resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

async fn get(app: &Router, path: &str, sid: Option<&str>) -> Response {
    let mut b = Request::builder().method("GET").uri(path);
    if let Some(sid) = sid { b = b.header(COOKIE, format!("{}={}", SESSION_COOKIE, sid)); }
    app.clone().oneshot(b.body(Body::empty()).unwrap()).await.unwrap()
}

async fn post(app: &Router, path: &str, sid: Option<&str>, content_type: &str, body: &str) -> Response {
    let mut b = Request::builder().method("POST").uri(path).header(CONTENT_TYPE, content_type);
    if let Some(sid) = sid { b = b.header(COOKIE, format!("{}={}", SESSION_COOKIE, sid)); }
    app.clone().oneshot(b.body(Body::from(body.to_string())).unwrap()).await.unwrap()
}

async fn post_form(app: &Router, path: &str, sid: Option<&str>, body: &str) -> Response {
    post(app, path, sid, "application/x-www-form-urlencoded", body).await
}

#[tokio::test]
async fn first_visit_issues_session_cookie() {
    let app = app();
    let resp = get(&app, "/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let sid = issued_cookie(&resp).expect("cookie issued");
    assert_eq!(body_text(resp).await, "You hit the home page!\n");

    // presenting the cookie again does not re-issue it
    let again = get(&app, "/login", Some(&sid)).await;
    assert!(issued_cookie(&again).is_none());
    assert_eq!(body_text(again).await, "You got the login page!\n");
}

#[tokio::test]
async fn login_success_unlocks_protected_route() {
    let app = app();
    let first = get(&app, "/login", None).await;
    let anon_sid = issued_cookie(&first).expect("cookie");

    let resp = post_form(&app, "/login", Some(&anon_sid), "email=a%40b.com&password=correct").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp).as_deref(), Some("/authrequired"));
    let sid = issued_cookie(&resp).expect("rotated cookie");
    assert_ne!(sid, anon_sid);

    let protected = get(&app, "/authrequired", Some(&sid)).await;
    assert_eq!(protected.status(), StatusCode::OK);
    assert_eq!(body_text(protected).await, "You hit the authentication endpoint\n");

    let status = get(&app, "/isauthenticated", Some(&sid)).await;
    assert_eq!(body_text(status).await, "Authenticated!");

    // the pre-login id no longer carries anything
    let old = get(&app, "/isauthenticated", Some(&anon_sid)).await;
    assert_eq!(body_text(old).await, "Log in!");
}

#[tokio::test]
async fn json_login_is_accepted() {
    let app = app();
    let resp = post(&app, "/login", None, "application/json", r#"{"email":"a@b.com","password":"correct"}"#).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let sid = issued_cookie(&resp).expect("cookie");
    assert_eq!(get(&app, "/authrequired", Some(&sid)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_echoes_rejection_and_stays_locked() {
    let app = app();
    let resp = post_form(&app, "/login", None, "email=a%40b.com&password=wrong").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let sid = issued_cookie(&resp).expect("anonymous session still issued");
    assert_eq!(body_text(resp).await, "Invalid credentials.\n");

    let protected = get(&app, "/authrequired", Some(&sid)).await;
    assert_eq!(protected.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&protected).as_deref(), Some("/"));
}

#[tokio::test]
async fn unknown_email_gets_the_same_rejection() {
    let app = app();
    let wrong_pw = body_text(post_form(&app, "/login", None, "email=a%40b.com&password=nope").await).await;
    let unknown = body_text(post_form(&app, "/login", None, "email=x%40y.com&password=correct").await).await;
    assert_eq!(wrong_pw, unknown);
}

#[tokio::test]
async fn logout_locks_the_session_again() {
    let app = app();
    let login = post_form(&app, "/login", None, "email=a%40b.com&password=correct").await;
    let sid = issued_cookie(&login).expect("cookie");

    let out = post(&app, "/logout", Some(&sid), "text/plain", "").await;
    assert_eq!(out.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&out).as_deref(), Some("/"));
    let fresh = issued_cookie(&out).expect("fresh anonymous cookie");
    assert_ne!(fresh, sid);

    let protected = get(&app, "/authrequired", Some(&sid)).await;
    assert_eq!(protected.status(), StatusCode::SEE_OTHER);
    let status = get(&app, "/isauthenticated", Some(&fresh)).await;
    assert_eq!(body_text(status).await, "Log in!");
}

#[tokio::test]
async fn directory_outage_is_a_server_error() {
    let app = app_with(Arc::new(DownDirectory));
    let resp = post_form(&app, "/login", None, "email=a%40b.com&password=correct").await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["code"], "directory_status");
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let app = app();
    let resp = post_form(&app, "/login", None, "email=a%40b.com").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["code"], "missing_credentials");
}

#[tokio::test]
async fn garbage_cookie_gets_a_new_session() {
    let app = app();
    let resp = get(&app, "/authrequired", Some("../../etc/passwd")).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(issued_cookie(&resp).is_some());
}
