//! Identity provider collaborator
//!
//! The token endpoint never mints access tokens itself. It asks the identity
//! provider that authenticated the user for one, scoped to that user.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::records::ProviderRef;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown identity provider: {0}")]
    UnknownProvider(ProviderRef),

    #[error("User id is required")]
    MissingUser,

    #[error("Identity provider error: {0}")]
    Other(String),
}

/// What the provider tells us about an access token it issued
#[derive(Debug, Clone)]
pub struct AccessTokenMetadata {
    /// The user the token was issued to, as resolved by the provider
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Issue an access token for `user_id` through `provider`, valid for `ttl`.
    ///
    /// Returns the token metadata and the opaque bearer string.
    async fn issue_access_token(
        &self,
        provider: &ProviderRef,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(AccessTokenMetadata, String), ProviderError>;
}

/// Provider that mints random opaque bearer tokens for a fixed set of
/// provider references.
pub struct LocalIdentityProvider {
    providers: HashSet<ProviderRef>,
}

impl LocalIdentityProvider {
    pub fn new(providers: impl IntoIterator<Item = ProviderRef>) -> Self {
        Self {
            providers: providers.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn issue_access_token(
        &self,
        provider: &ProviderRef,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(AccessTokenMetadata, String), ProviderError> {
        if !self.providers.contains(provider) {
            return Err(ProviderError::UnknownProvider(provider.clone()));
        }
        if user_id.is_empty() {
            return Err(ProviderError::MissingUser);
        }

        let token = {
            use rand::Rng;
            let mut bytes = [0u8; 32];
            rand::rng().fill(&mut bytes);
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
        };

        tracing::debug!("Issued access token for user {} via {}", user_id, provider);

        Ok((
            AccessTokenMetadata {
                user_id: user_id.to_string(),
                expires_at: Utc::now() + ttl,
            },
            token,
        ))
    }
}
