//! HTTP route handlers.
//!
//! Handlers return [`ApiErr`] so every [`AppError`] kind maps to its own
//! status code. Error bodies are plain text.

mod auth;
mod dashboard;
mod mirror;
mod pipelines;

pub use auth::auth_routes;
pub use dashboard::dashboard_routes;
pub use mirror::mirror_routes;
pub use pipelines::pipeline_routes;

use crate::error::AppError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

/// Wrapper to make AppError usable as an axum error response.
#[derive(Debug)]
pub struct ApiErr(pub AppError);

impl ApiErr {
    /// Status code for the wrapped error. `None` means "redirect to sign-in".
    pub fn status(&self) -> Option<StatusCode> {
        let status = match &self.0 {
            AppError::Authentication { .. } => return None,
            AppError::RemoteApi {
                status_code: Some(404),
                ..
            } => StatusCode::NOT_FOUND,
            AppError::Transport { .. } | AppError::Parse { .. } | AppError::RemoteApi { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::UnsupportedSource { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StaleConcurrencyToken { .. } => StatusCode::CONFLICT,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::MissingMetadata { .. }
            | AppError::Database { .. }
            | AppError::Template { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Some(status)
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let Some(status) = self.status() else {
            return Redirect::to("/login").into_response();
        };

        if status.is_server_error() && !self.0.is_remote_failure() {
            log::error!("[server] Request failed: {}", self.0);
        }

        (status, self.0.to_string()).into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for ApiErr {
    fn from(err: sqlx::Error) -> Self {
        Self(AppError::from(err))
    }
}
