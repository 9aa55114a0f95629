//! `refresh_token` grant with rotation
//!
//! Every use deletes the presented token before anything else is issued, so
//! a refresh token is good for exactly one exchange.

use std::sync::Arc;

use tracing::Span;

use crate::error::TokenError;
use crate::oauth::issue::TokenIssuer;
use crate::oauth::token::TokenResponse;
use crate::records::{OAuthClient, OAuthToken, RecordKey};
use crate::storage::{hash_token, RecordStore};

pub struct RefreshTokenRotator {
    store: Arc<dyn RecordStore>,
    issuer: Arc<TokenIssuer>,
    span: Span,
}

impl RefreshTokenRotator {
    pub fn new(store: Arc<dyn RecordStore>, issuer: Arc<TokenIssuer>, span: Span) -> Self {
        Self {
            store,
            issuer,
            span,
        }
    }

    #[tracing::instrument(
        name = "refresh_token",
        parent = &self.span,
        skip_all,
        fields(client = %client.client_id())
    )]
    pub async fn rotate(
        &self,
        client: &OAuthClient,
        refresh_token: &str,
    ) -> Result<TokenResponse, TokenError> {
        if refresh_token.is_empty() {
            return Err(TokenError::invalid_request("refresh_token is required"));
        }

        let key = RecordKey::new(&client.namespace, hash_token(refresh_token));
        let old: OAuthToken = match self.store.get_record(&key).await {
            Ok(token) => token,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!("Refresh token lookup failed: {}", e);
                }
                return Err(TokenError::invalid_request("refresh_token is invalid"));
            }
        };

        if old.client_id != client.name {
            tracing::warn!("Refresh token {} belongs to client {}", key, old.client_id);
            return Err(TokenError::invalid_request("refresh_token is invalid"));
        }

        match self.store.delete_record(&old).await {
            Ok(()) => {}
            // Lost a race with another rotation of the same token
            Err(e) if e.is_not_found() => {
                return Err(TokenError::invalid_request("refresh_token is invalid"));
            }
            Err(e) => return Err(TokenError::store("failed to refresh oauth token")(e)),
        }

        let response = self.issuer.issue(client, &old.provider, &old.user_id).await?;

        tracing::info!("Rotated refresh token for user {}", old.user_id);
        Ok(response)
    }
}
