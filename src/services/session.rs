//! Browser sessions and the per-request context.
//!
//! Sessions live in memory, keyed by a random UUID. The cookie carries the
//! id plus a SHA-256 digest keyed with the configured secret, so a forged or
//! truncated cookie never maps onto an existing session. Handlers receive a
//! [`RequestContext`] snapshot instead of reaching into the store.

use crate::error::AppError;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "dashboard_session";

/// Sessions idle longer than this are dropped.
const SESSION_IDLE_SECS: i64 = 7 * 24 * 60 * 60;

/// The signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Display name. Local mirror records are owned by this value.
    pub name: String,
    pub preferred_username: Option<String>,
    /// Stable subject id (`oid` or `sub`).
    pub subject: Option<String>,
}

/// Everything remembered for one browser session.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub user: Option<UserIdentity>,
    /// Active remote project; not validated against the project list.
    pub project: Option<String>,
    /// Pending OAuth `state` between `/login` and the callback.
    pub oauth_state: Option<String>,
    /// Normalized copy of the last YAML document uploaded to the mirror.
    pub uploaded_yaml: Option<String>,
    last_active: i64,
}

/// Shared in-memory session store.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    secret: Arc<str>,
}

impl SessionStore {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            secret: secret.into(),
        }
    }

    fn sign(&self, id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Cookie value for a session id.
    pub fn cookie_value(&self, id: &str) -> String {
        format!("{}.{}", id, self.sign(id))
    }

    /// Return the session id if the cookie value carries a valid signature.
    pub fn verify_cookie(&self, value: &str) -> Option<String> {
        let (id, signature) = value.split_once('.')?;
        if id.is_empty() || !constant_time_eq(signature.as_bytes(), self.sign(id).as_bytes()) {
            return None;
        }
        Some(id.to_string())
    }

    /// Start a new empty session and return its id.
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.update(&id, |_| {}).await;
        id
    }

    /// Mark a session active. Returns `false` if it does not exist.
    pub async fn touch(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(data) => {
                data.last_active = Utc::now().timestamp();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<SessionData> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Apply `f` to the session's data, storing the session first if it
    /// is not stored yet. Idle sessions are pruned whenever one is added.
    pub async fn update<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut SessionData),
    {
        let now = Utc::now().timestamp();
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(id) {
            sessions.retain(|_, data| now - data.last_active < SESSION_IDLE_SECS);
        }
        let data = sessions.entry(id.to_string()).or_insert_with(|| SessionData {
            last_active: now,
            ..Default::default()
        });
        f(data);
    }

    /// Forget the user, project and everything else in a session.
    pub async fn clear(&self, id: &str) {
        if let Some(data) = self.sessions.write().await.get_mut(id) {
            *data = SessionData {
                last_active: data.last_active,
                ..Default::default()
            };
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract the session cookie value from request headers.
fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|c| {
            c.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
}

/// Session id attached to a request by [`session_middleware`].
#[derive(Clone)]
struct SessionHandle {
    id: String,
    store: SessionStore,
}

/// axum middleware that resolves the caller's session.
///
/// A missing, forged or expired cookie gets a fresh id that is only stored
/// once a handler writes to it. The cookie is issued on that response.
pub async fn session_middleware(
    State(store): State<SessionStore>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = match session_cookie(request.headers()).and_then(|v| store.verify_cookie(v)) {
        Some(id) => store.touch(&id).await.then_some(id),
        None => None,
    };

    let is_new = existing.is_none();
    let id = existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(SessionHandle {
        id: id.clone(),
        store: store.clone(),
    });

    let mut response = next.run(request).await;

    if is_new && store.contains(&id).await {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            store.cookie_value(&id),
            SESSION_IDLE_SECS
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => log::error!("[session] Failed to encode session cookie: {}", e),
        }
    }

    response
}

/// Per-request view of the caller's session.
#[derive(Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub user: Option<UserIdentity>,
    pub project: Option<String>,
    pub oauth_state: Option<String>,
    pub uploaded_yaml: Option<String>,
    store: SessionStore,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let handle = parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session layer missing"))?;

        let data = handle.store.get(&handle.id).await.unwrap_or_default();

        Ok(Self {
            session_id: handle.id,
            user: data.user,
            project: data.project,
            oauth_state: data.oauth_state,
            uploaded_yaml: data.uploaded_yaml,
            store: handle.store,
        })
    }
}

impl RequestContext {
    /// The signed-in user, or an authentication error.
    pub fn require_user(&self) -> Result<&UserIdentity, AppError> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::authentication("Sign in required"))
    }

    /// Record the active project. Any value is accepted.
    pub async fn select_project(&self, project: &str) {
        let project = project.to_string();
        self.store
            .update(&self.session_id, |data| data.project = Some(project))
            .await;
    }

    /// Mutate the underlying session.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionData),
    {
        self.store.update(&self.session_id, f).await;
    }

    /// Log out: drop everything held by the session.
    pub async fn clear(&self) {
        self.store.clear(&self.session_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_cookie_signature_roundtrip() {
        let store = SessionStore::new("secret");
        let value = store.cookie_value("abc");
        assert_eq!(store.verify_cookie(&value).as_deref(), Some("abc"));
    }

    #[test]
    fn test_tampered_cookie_rejected() {
        let store = SessionStore::new("secret");
        let value = store.cookie_value("abc");
        let forged = value.replacen("abc", "abd", 1);
        assert!(store.verify_cookie(&forged).is_none());
        assert!(store.verify_cookie("abc").is_none());

        let other = SessionStore::new("other-secret");
        assert!(other.verify_cookie(&value).is_none());
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; dashboard_session=id.sig; other=1"),
        );
        assert_eq!(session_cookie(&headers), Some("id.sig"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("dashboard_session_old=x"),
        );
        assert_eq!(session_cookie(&headers), None);
    }

    #[tokio::test]
    async fn test_clear_forgets_user_and_project() {
        let store = SessionStore::new("secret");
        let id = store.create().await;
        store
            .update(&id, |d| {
                d.project = Some("Apollo".to_string());
                d.user = Some(UserIdentity {
                    name: "Ada".to_string(),
                    preferred_username: None,
                    subject: None,
                });
            })
            .await;

        store.clear(&id).await;

        let data = store.get(&id).await.unwrap();
        assert!(data.user.is_none());
        assert!(data.project.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_pruned_on_create() {
        let store = SessionStore::new("secret");
        let stale = store.create().await;
        store
            .update(&stale, |d| d.last_active = Utc::now().timestamp() - SESSION_IDLE_SECS - 1)
            .await;

        store.create().await;

        assert!(store.get(&stale).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    fn app(store: SessionStore) -> Router {
        Router::new()
            .route(
                "/",
                get(|ctx: RequestContext| async move {
                    ctx.project.unwrap_or_else(|| "none".to_string())
                }),
            )
            .route(
                "/select",
                get(|ctx: RequestContext| async move {
                    ctx.select_project("Apollo").await;
                    "ok"
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                store,
                session_middleware,
            ))
    }

    #[tokio::test]
    async fn test_anonymous_reads_store_nothing() {
        let store = SessionStore::new("secret");
        for _ in 0..50 {
            let resp = app(store.clone())
                .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(resp.headers().get(header::SET_COOKIE).is_none());
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_clear_does_not_store_unknown_session() {
        let store = SessionStore::new("secret");
        store.clear("missing").await;
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_middleware_issues_cookie_once_session_is_written() {
        let store = SessionStore::new("secret");
        let resp = app(store.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/select")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("dashboard_session="));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_middleware_reuses_valid_session() {
        let store = SessionStore::new("secret");
        let id = store.create().await;
        let cookie = format!("{}={}", SESSION_COOKIE, store.cookie_value(&id));

        let resp = app(store.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/select")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(
            store.get(&id).await.unwrap().project.as_deref(),
            Some("Apollo")
        );
    }
}
