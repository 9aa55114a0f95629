//! Access token issuance and refresh-token minting, shared by both grants

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::TokenError;
use crate::oauth::token::TokenResponse;
use crate::provider::IdentityProvider;
use crate::records::{OAuthClient, OAuthToken, ProviderRef};
use crate::storage::{generate_refresh_token, hash_token, RecordStore};

pub struct TokenIssuer {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn IdentityProvider>,
    access_token_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn IdentityProvider>,
        access_token_lifetime: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            access_token_lifetime,
        }
    }

    /// Get an access token from the identity provider for `user_id`, then mint
    /// and persist a refresh token bound to the client, user, and provider.
    pub async fn issue(
        &self,
        client: &OAuthClient,
        provider: &ProviderRef,
        user_id: &str,
    ) -> Result<TokenResponse, TokenError> {
        let (metadata, access_token) = self
            .provider
            .issue_access_token(provider, user_id, self.access_token_lifetime)
            .await
            .map_err(TokenError::provider("failed to create auth token"))?;

        let refresh_token = generate_refresh_token();
        let record = OAuthToken {
            namespace: client.namespace.clone(),
            name: hash_token(&refresh_token),
            client_id: client.name.clone(),
            user_id: metadata.user_id.clone(),
            provider: provider.clone(),
            created_at: Utc::now(),
        };

        self.store
            .create_record(&record)
            .await
            .map_err(TokenError::store("failed to create oauth token"))?;

        Ok(TokenResponse::bearer(
            access_token,
            metadata.expires_at,
            refresh_token,
        ))
    }
}
