//! Application error types.
//!
//! Every failure a handler can hit is expressed as an [`AppError`] variant so
//! the HTTP layer can pick a status code per kind instead of returning
//! uniform text.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned from services and route handlers.
///
/// All variants serialize to a structured JSON object for logging and tests.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Local mirror storage failed.
    #[error("Database error: {message}")]
    Database { message: String },

    /// The remote API could not be reached.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The remote API answered with a body that could not be decoded.
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// The remote API answered with a non-success status.
    #[error("Azure DevOps API error: {message}")]
    RemoteApi {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// A value the remote API was expected to provide is absent.
    #[error("{message}")]
    MissingMetadata { message: String, field: String },

    /// The pipeline is backed by a source this dashboard cannot edit.
    #[error("{message}")]
    UnsupportedSource {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        repo_type: Option<String>,
    },

    /// A push was rejected because the branch head moved.
    #[error("{message}")]
    StaleConcurrencyToken {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        old_object_id: Option<String>,
    },

    /// Authentication is required or the login flow failed.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Template rendering failed.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Undecodable body from `endpoint`.
    pub fn parse(message: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Non-success answer from the remote API.
    pub fn remote_api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::RemoteApi {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// `field` was absent from a remote response.
    pub fn missing_metadata(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingMetadata {
            message: message.into(),
            field: field.into(),
        }
    }

    pub fn unsupported_source(message: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            message: message.into(),
            repo_type: None,
        }
    }

    pub fn unsupported_repo_type(message: impl Into<String>, repo_type: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            message: message.into(),
            repo_type: Some(repo_type.into()),
        }
    }

    /// Push rejected; `old_object_id` is the head the push was anchored to.
    pub fn stale_token(message: impl Into<String>, old_object_id: Option<String>) -> Self {
        Self::StaleConcurrencyToken {
            message: message.into(),
            old_object_id,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Rejected form value; `field` names the offending input.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error came from the remote API or the path to it.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Parse { .. } | Self::RemoteApi { .. }
        )
    }

    /// Get the remote status code, if the remote API answered at all.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Row"),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport("Request timed out")
        } else if err.is_connect() {
            Self::transport("Failed to connect to server")
        } else if err.is_decode() {
            Self::Parse {
                message: err.to_string(),
                endpoint: err.url().map(|u| u.path().to_string()),
            }
        } else if let Some(status) = err.status() {
            Self::RemoteApi {
                message: format!("HTTP error: {}", err),
                status_code: Some(status.as_u16()),
                endpoint: err.url().map(|u| u.path().to_string()),
            }
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<tera::Error> for AppError {
    fn from(err: tera::Error) -> Self {
        // tera nests the useful message in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::template(message)
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::database(err.to_string())
    }
}

/// Failures that abort startup before the server is listening.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Database(#[from] crate::db::DbError),

    #[error(transparent)]
    App(#[from] AppError),
}
