//! Environment-driven application configuration.
//!
//! Values are read from the process environment after `.env` has been
//! loaded. The Azure DevOps credentials and the identity provider settings
//! are mandatory; everything else has a default.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling [`AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Paths already served by the app; the OAuth callback may not reuse them.
const RESERVED_PATHS: &[&str] = &[
    "/",
    "/login",
    "/logout",
    "/boards",
    "/pipelines",
    "/mirror",
    "/mirror/",
    "/mirror/create_project",
    "/mirror/pipelines",
    "/mirror/upload_yaml",
    "/static",
];

/// Default Azure DevOps host; the organization is appended as a path segment.
pub const DEFAULT_DEVOPS_BASE_URL: &str = "https://dev.azure.com";

/// Identity provider (OAuth 2.0 / OpenID Connect) settings.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Authority URL, e.g. `https://login.microsoftonline.com/<tenant>`.
    pub authority: String,
    pub client_id: String,
    pub client_secret: String,
    /// Absolute callback URL registered with the provider.
    pub redirect_uri: String,
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Azure DevOps organization name.
    pub organization: String,

    /// Personal access token used for Basic auth against the REST API.
    pub personal_access_token: String,

    /// Base URL of the DevOps service (without the organization).
    pub devops_base_url: String,

    /// Outbound request timeout in seconds.
    pub request_timeout_secs: u64,

    pub identity: IdentityConfig,

    /// Secret used to sign session cookies.
    pub session_secret: String,

    /// SQLite database file for the local mirror.
    pub database_path: PathBuf,

    /// Directory served under `/static`.
    pub static_dir: PathBuf,

    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Load `.env` (if present) and read the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("[config] Failed to read .env: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let request_timeout_secs = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "REQUEST_TIMEOUT_SECS",
                message: format!("{}", e),
            })?,
            None => 30,
        };

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:5000".to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                message: format!("{}", e),
            })?;

        let redirect_uri = required("REDIRECT_URI")?;
        let callback = reqwest::Url::parse(&redirect_uri).map_err(|_| ConfigError::Invalid {
            name: "REDIRECT_URI",
            message: "must be an absolute URL".to_string(),
        })?;
        let path = callback.path();
        if RESERVED_PATHS.contains(&path)
            || path.starts_with("/static/")
            || path.starts_with("/select/")
        {
            return Err(ConfigError::Invalid {
                name: "REDIRECT_URI",
                message: format!("callback path {} is already served by the dashboard", path),
            });
        }

        Ok(Self {
            organization: required("AZURE_ORGANIZATION")?,
            personal_access_token: required("AZURE_DEVOPS_PAT")?,
            devops_base_url: lookup("AZURE_DEVOPS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DEVOPS_BASE_URL.to_string()),
            request_timeout_secs,
            identity: IdentityConfig {
                authority: required("AUTHORITY")?,
                client_id: required("CLIENT_ID")?,
                client_secret: required("CLIENT_SECRET")?,
                redirect_uri,
            },
            session_secret: required("SECRET_KEY")?,
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("dashboard.db")),
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            bind_addr,
        })
    }

    /// Path component of the redirect URI; the OAuth callback is mounted here.
    pub fn callback_path(&self) -> String {
        reqwest::Url::parse(&self.identity.redirect_uri)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/auth/callback".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("AZURE_ORGANIZATION", "contoso"),
            ("AZURE_DEVOPS_PAT", "pat-123"),
            ("AUTHORITY", "https://login.microsoftonline.com/common"),
            ("CLIENT_ID", "client"),
            ("CLIENT_SECRET", "secret"),
            ("REDIRECT_URI", "http://localhost:5000/getAToken"),
            ("SECRET_KEY", "session-secret"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.organization, "contoso");
        assert_eq!(config.devops_base_url, DEFAULT_DEVOPS_BASE_URL);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.database_path, PathBuf::from("dashboard.db"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:5000");
        assert_eq!(config.callback_path(), "/getAToken");
    }

    #[test]
    fn test_missing_pat_is_reported() {
        let mut env = base_env();
        env.remove("AZURE_DEVOPS_PAT");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("AZURE_DEVOPS_PAT")));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("AZURE_ORGANIZATION", "  ");
        let err = load(&env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required environment variable AZURE_ORGANIZATION"
        );
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let mut env = base_env();
        env.insert("REQUEST_TIMEOUT_SECS", "soon");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Invalid {
                name: "REQUEST_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_callback_path_clashing_with_a_page_rejected() {
        for uri in [
            "http://localhost:5000/",
            "http://localhost:5000",
            "http://localhost:5000/login",
            "http://localhost:5000/boards",
            "http://localhost:5000/mirror/",
            "http://localhost:5000/static/style.css",
        ] {
            let mut env = base_env();
            env.insert("REDIRECT_URI", uri);
            assert!(
                matches!(
                    load(&env).unwrap_err(),
                    ConfigError::Invalid {
                        name: "REDIRECT_URI",
                        ..
                    }
                ),
                "{}",
                uri
            );
        }
    }

    #[test]
    fn test_relative_redirect_uri_rejected() {
        let mut env = base_env();
        env.insert("REDIRECT_URI", "/getAToken");
        assert!(load(&env).is_err());
    }
}
