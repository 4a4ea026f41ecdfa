//! OAuth 2.0 authorization-code sign-in against the identity provider.

use crate::config::IdentityConfig;
use crate::error::AppError;
use crate::services::session::UserIdentity;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;

/// Scopes requested at sign-in.
pub const OAUTH_SCOPES: &str = "openid profile offline_access";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    name: Option<String>,
    preferred_username: Option<String>,
    oid: Option<String>,
    sub: Option<String>,
}

/// Client for the provider's authorize and token endpoints.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    config: IdentityConfig,
}

impl IdentityClient {
    pub fn new(config: IdentityConfig, timeout_secs: u64) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/oauth2/v2.0/{}",
            self.config.authority.trim_end_matches('/'),
            name
        )
    }

    /// URL the browser is sent to for sign-in.
    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", OAUTH_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::internal(format!("Invalid authority URL: {}", e)))?;

        Ok(url.to_string())
    }

    /// Redeem an authorization code and return the signed-in user.
    pub async fn exchange_code(&self, code: &str) -> Result<UserIdentity, AppError> {
        let response = self
            .client
            .post(self.endpoint("token"))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", OAUTH_SCOPES),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: TokenResponse = response.json().await.map_err(|e| {
            AppError::authentication(format!("Unreadable token response ({}): {}", status, e))
        })?;

        if let Some(error) = body.error {
            let detail = body.error_description.unwrap_or_default();
            log::warn!("[auth] Token endpoint refused the code: {} {}", error, detail);
            return Err(AppError::authentication(format!("{}: {}", error, detail)));
        }

        let id_token = body
            .id_token
            .ok_or_else(|| AppError::authentication("Token response carried no id_token"))?;

        identity_from_id_token(&id_token)
    }
}

/// Read the user claims from a JWT id token.
///
/// The token comes straight from the token endpoint over TLS, so the
/// signature is not checked.
pub fn identity_from_id_token(id_token: &str) -> Result<UserIdentity, AppError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::authentication("Malformed id_token"))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AppError::authentication(format!("Malformed id_token payload: {}", e)))?;

    let claims: IdTokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::authentication(format!("Unreadable id_token claims: {}", e)))?;

    let name = claims
        .name
        .or_else(|| claims.preferred_username.clone())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::authentication("id_token carries no user name"))?;

    Ok(UserIdentity {
        name,
        preferred_username: claims.preferred_username,
        subject: claims.oid.or(claims.sub),
    })
}
