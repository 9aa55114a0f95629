//! OAuth2 Token Endpoint
//!
//! Handles:
//! - Client authentication (HTTP Basic or form credentials)
//! - Authorization code exchange (with PKCE verification)
//! - Refresh token grants (with rotation)

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Form, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::TokenError;
use crate::oauth::authorization_code::AuthorizationCodeExchanger;
use crate::oauth::client_auth::ClientAuthenticator;
use crate::oauth::credentials;
use crate::oauth::grant::GrantType;
use crate::oauth::issue::TokenIssuer;
use crate::oauth::refresh::RefreshTokenRotator;
use crate::provider::IdentityProvider;
use crate::storage::RecordStore;
use crate::AppState;

/// Token request (form-encoded). Absent fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,

    /// Authorization code (for authorization_code grant)
    #[serde(default)]
    pub code: String,

    /// PKCE code verifier (for authorization_code grant)
    #[serde(default)]
    pub code_verifier: String,

    /// Refresh token (for refresh_token grant)
    #[serde(default)]
    pub refresh_token: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,
}

/// Successful token response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, expires_at: DateTime<Utc>, refresh_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: seconds_until(expires_at, Utc::now()),
            refresh_token,
        }
    }
}

/// Whole seconds from `now` until `expires_at`, never negative
fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((expires_at - now).num_seconds()).unwrap_or(0)
}

/// The token endpoint: credential resolution, client authentication, and
/// dispatch to the grant handlers.
pub struct TokenEndpoint {
    authenticator: ClientAuthenticator,
    codes: AuthorizationCodeExchanger,
    refresh: RefreshTokenRotator,
}

impl TokenEndpoint {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn IdentityProvider>,
        grant_types_supported: Vec<GrantType>,
        access_token_lifetime: Duration,
        span: Span,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::new(
            store.clone(),
            provider,
            access_token_lifetime,
        ));
        Self {
            authenticator: ClientAuthenticator::new(
                store.clone(),
                grant_types_supported,
                span.clone(),
            ),
            codes: AuthorizationCodeExchanger::new(store.clone(), issuer.clone(), span.clone()),
            refresh: RefreshTokenRotator::new(store, issuer, span),
        }
    }

    pub async fn token(
        &self,
        headers: &HeaderMap,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenError> {
        let credentials =
            credentials::resolve(headers, &request.client_id, &request.client_secret)?;
        let client = self.authenticator.authenticate(&credentials).await?;

        match self.authenticator.authorize_grant(&client, &request.grant_type)? {
            GrantType::AuthorizationCode => {
                self.codes
                    .exchange(&client, &request.code, &request.code_verifier)
                    .await
            }
            GrantType::RefreshToken => self.refresh.rotate(&client, &request.refresh_token).await,
        }
    }
}

/// Handler for `POST /token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, TokenError> {
    let Form(request) = form.map_err(|e| {
        tracing::debug!("Rejected token request body: {}", e);
        TokenError::invalid_request("request body must be application/x-www-form-urlencoded")
    })?;

    let response = state.tokens.token(&headers, &request).await?;

    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(response),
    )
        .into_response())
}
