//! Sign-in, sign-out and the OAuth callback.

use super::ApiErr;
use crate::services::session::RequestContext;
use crate::services::web_server::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

pub fn auth_routes(callback_path: &str) -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/logout", get(logout))
        .route(callback_path, get(callback))
}

async fn login(State(state): State<AppState>, ctx: RequestContext) -> Result<Redirect, ApiErr> {
    let oauth_state = uuid::Uuid::new_v4().simple().to_string();
    let url = state.identity.authorize_url(&oauth_state)?;

    ctx.update(|data| data.oauth_state = Some(oauth_state)).await;
    Ok(Redirect::to(&url))
}

async fn logout(ctx: RequestContext) -> Redirect {
    if let Some(user) = &ctx.user {
        log::info!("[auth] {} signed out", user.name);
    }
    ctx.clear().await;
    Redirect::to("/")
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn sign_in_failed(message: &str) -> Response {
    log::warn!("[auth] Sign-in failed: {}", message);
    (StatusCode::UNAUTHORIZED, format!("Sign-in failed: {}", message)).into_response()
}

async fn callback(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or_default();
        return sign_in_failed(&format!("{} {}", error, detail));
    }

    let expected = ctx.oauth_state.as_deref();
    if expected.is_none() || query.state.as_deref() != expected {
        return sign_in_failed("state mismatch");
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return sign_in_failed("no authorization code");
    };

    match state.identity.exchange_code(&code).await {
        Ok(user) => {
            log::info!("[auth] {} signed in", user.name);
            ctx.update(|data| {
                data.user = Some(user);
                data.oauth_state = None;
            })
            .await;
            Redirect::to("/").into_response()
        }
        Err(e) => sign_in_failed(&e.to_string()),
    }
}
