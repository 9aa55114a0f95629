//! OAuth2 token issuance for the MCP gateway
//!
//! Provides:
//! - `POST /token`: authorization code exchange with PKCE and refresh-token rotation
//! - RFC 8414 metadata discovery for the token endpoint
//!
//! Client records, authorization requests, and refresh tokens live in a
//! [`storage::RecordStore`]; access tokens come from an
//! [`provider::IdentityProvider`].

pub mod config;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod records;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Config;
use crate::oauth::token::TokenEndpoint;
use crate::provider::IdentityProvider;
use crate::storage::RecordStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub tokens: TokenEndpoint,
    pub public_url: String,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn IdentityProvider>,
        public_url: String,
    ) -> Self {
        let tokens = TokenEndpoint::new(
            store,
            provider,
            config.grant_types_supported.clone(),
            config.access_token_lifetime(),
            tracing::info_span!("token_endpoint"),
        );
        Self {
            config,
            tokens,
            public_url,
        }
    }
}

/// Build the service router
pub fn router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // OAuth metadata (RFC 8414)
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth::metadata::handler),
        )
        // Token endpoint
        .route("/token", post(oauth::token::handler))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
