//! RFC 8414: OAuth 2.0 Authorization Server Metadata
//!
//! Provides the `/.well-known/oauth-authorization-server` endpoint that clients
//! use to discover the token endpoint and its capabilities.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::oauth::grant::GrantType;
use crate::records::TokenEndpointAuthMethod;
use crate::AppState;

/// OAuth 2.0 Authorization Server Metadata (RFC 8414), token-endpoint subset
#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    /// The authorization server's issuer identifier (URL)
    pub issuer: String,

    /// URL of the token endpoint
    pub token_endpoint: String,

    /// JSON array of OAuth 2.0 grant_type values supported
    pub grant_types_supported: Vec<GrantType>,

    /// JSON array of PKCE code challenge methods supported
    pub code_challenge_methods_supported: Vec<&'static str>,

    /// JSON array of client authentication methods supported at token endpoint
    pub token_endpoint_auth_methods_supported: Vec<TokenEndpointAuthMethod>,
}

/// Handler for `GET /.well-known/oauth-authorization-server`
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<AuthorizationServerMetadata> {
    let base_url = state.public_url.trim_end_matches('/');

    let metadata = AuthorizationServerMetadata {
        issuer: base_url.to_string(),
        token_endpoint: format!("{}/token", base_url),
        grant_types_supported: state.config.grant_types_supported.clone(),
        code_challenge_methods_supported: vec!["S256", "plain"],
        token_endpoint_auth_methods_supported: vec![
            TokenEndpointAuthMethod::None,
            TokenEndpointAuthMethod::ClientSecretBasic,
            TokenEndpointAuthMethod::ClientSecretPost,
        ],
    };

    tracing::debug!("Serving authorization server metadata");
    Json(metadata)
}
