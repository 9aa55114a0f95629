//! Client authentication and grant-type authorization

use std::sync::Arc;

use tracing::Span;

use crate::error::TokenError;
use crate::oauth::credentials::ClientCredentials;
use crate::oauth::grant::{self, GrantType};
use crate::records::OAuthClient;
use crate::storage::RecordStore;

pub struct ClientAuthenticator {
    store: Arc<dyn RecordStore>,
    grant_types_supported: Vec<GrantType>,
    span: Span,
}

impl ClientAuthenticator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        grant_types_supported: Vec<GrantType>,
        span: Span,
    ) -> Self {
        Self {
            store,
            grant_types_supported,
            span,
        }
    }

    /// Load the client and check its secret if its auth method requires one.
    ///
    /// An unknown client and a wrong secret produce the same error.
    #[tracing::instrument(
        name = "client_auth",
        parent = &self.span,
        skip_all,
        fields(client = %credentials.client_id)
    )]
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, TokenError> {
        let client: OAuthClient = match self
            .store
            .get_record(&credentials.client_id.key())
            .await
        {
            Ok(client) => client,
            Err(e) if e.is_not_found() => {
                tracing::warn!("Token request from unknown client");
                return Err(TokenError::InvalidClient);
            }
            Err(e) => return Err(TokenError::store("failed to load oauth client")(e)),
        };

        if client.token_endpoint_auth_method.requires_secret()
            && !verify_secret(&credentials.secret, &client.client_secret_hash).await
        {
            tracing::warn!(
                "Client secret mismatch ({})",
                client.token_endpoint_auth_method.as_str()
            );
            return Err(TokenError::InvalidClient);
        }

        Ok(client)
    }

    /// The requested grant must be supported by the server and allowed for
    /// this client.
    pub fn authorize_grant(
        &self,
        client: &OAuthClient,
        requested: &str,
    ) -> Result<GrantType, TokenError> {
        let grant = requested
            .parse::<GrantType>()
            .ok()
            .filter(|g| self.grant_types_supported.contains(g))
            .ok_or_else(|| {
                TokenError::invalid_request(format!(
                    "grant_type must be one of {}, not {}",
                    grant::join(&self.grant_types_supported),
                    requested
                ))
            })?;

        if !client.grant_types.iter().any(|g| g == grant.as_str()) {
            let allowed = if client.grant_types.is_empty() {
                "none".to_string()
            } else {
                client.grant_types.join(", ")
            };
            return Err(TokenError::invalid_request(format!(
                "client is not allowed to use {} grant type, allowed grant types: {}",
                grant, allowed
            )));
        }

        Ok(grant)
    }
}

/// bcrypt comparison, run off the async workers. Any failure is a mismatch.
async fn verify_secret(secret: &str, hash: &str) -> bool {
    if hash.is_empty() {
        return false;
    }

    let secret = secret.to_string();
    let hash = hash.to_string();
    match tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash)).await {
        Ok(Ok(matched)) => matched,
        Ok(Err(e)) => {
            tracing::warn!("Stored client secret hash is unusable: {}", e);
            false
        }
        Err(e) => {
            tracing::error!("Secret verification task failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::credentials::ClientId;
    use crate::records::TokenEndpointAuthMethod;
    use crate::storage::LocalStore;

    fn client(method: TokenEndpointAuthMethod, secret: &str, grants: &[&str]) -> OAuthClient {
        OAuthClient {
            namespace: "acme".to_string(),
            name: "web".to_string(),
            token_endpoint_auth_method: method,
            client_secret_hash: if secret.is_empty() {
                String::new()
            } else {
                bcrypt::hash(secret, 4).unwrap()
            },
            grant_types: grants.iter().map(|g| g.to_string()).collect(),
        }
    }

    fn credentials(secret: &str) -> ClientCredentials {
        ClientCredentials {
            client_id: ClientId::parse("acme:web").unwrap(),
            secret: secret.to_string(),
        }
    }

    async fn authenticator_with(client: Option<OAuthClient>) -> ClientAuthenticator {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        if let Some(client) = client {
            store.create_record(&client).await.unwrap();
        }
        ClientAuthenticator::new(
            store,
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            Span::none(),
        )
    }

    fn description(err: TokenError) -> String {
        match err {
            TokenError::InvalidRequest(d) => d,
            other => panic!("expected invalid_request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_secret_client_accepts_matching_secret() {
        let auth = authenticator_with(Some(client(
            TokenEndpointAuthMethod::ClientSecretBasic,
            "s3cr3t",
            &["authorization_code"],
        )))
        .await;
        let loaded = auth.authenticate(&credentials("s3cr3t")).await.unwrap();
        assert_eq!(loaded.client_id(), "acme:web");
    }

    #[tokio::test]
    async fn test_secret_client_rejects_wrong_secret() {
        let auth = authenticator_with(Some(client(
            TokenEndpointAuthMethod::ClientSecretPost,
            "s3cr3t",
            &["authorization_code"],
        )))
        .await;
        for wrong in ["", "s3cr3", "S3CR3T", "s3cr3t "] {
            assert!(matches!(
                auth.authenticate(&credentials(wrong)).await,
                Err(TokenError::InvalidClient)
            ));
        }
    }

    #[tokio::test]
    async fn test_public_client_skips_secret() {
        let auth = authenticator_with(Some(client(
            TokenEndpointAuthMethod::None,
            "",
            &["authorization_code"],
        )))
        .await;
        assert!(auth.authenticate(&credentials("anything")).await.is_ok());
    }

    #[tokio::test]
    async fn test_secret_client_without_hash_is_rejected() {
        let auth = authenticator_with(Some(client(
            TokenEndpointAuthMethod::ClientSecretBasic,
            "",
            &["authorization_code"],
        )))
        .await;
        assert!(matches!(
            auth.authenticate(&credentials("")).await,
            Err(TokenError::InvalidClient)
        ));
    }

    #[tokio::test]
    async fn test_unknown_client_looks_like_bad_secret() {
        let auth = authenticator_with(None).await;
        assert!(matches!(
            auth.authenticate(&credentials("s3cr3t")).await,
            Err(TokenError::InvalidClient)
        ));
    }

    #[tokio::test]
    async fn test_grant_must_be_supported_and_allowed() {
        let auth = authenticator_with(None).await;
        let web = client(
            TokenEndpointAuthMethod::None,
            "",
            &["authorization_code", "refresh_token"],
        );

        assert_eq!(
            auth.authorize_grant(&web, "authorization_code").unwrap(),
            GrantType::AuthorizationCode
        );
        assert_eq!(
            auth.authorize_grant(&web, "refresh_token").unwrap(),
            GrantType::RefreshToken
        );

        let err = auth.authorize_grant(&web, "client_credentials").unwrap_err();
        assert_eq!(
            description(err),
            "grant_type must be one of authorization_code, refresh_token, not client_credentials"
        );
    }

    #[tokio::test]
    async fn test_grant_outside_client_allow_list_is_rejected() {
        let auth = authenticator_with(None).await;
        let web = client(TokenEndpointAuthMethod::None, "", &["authorization_code"]);

        let err = auth.authorize_grant(&web, "refresh_token").unwrap_err();
        assert_eq!(
            description(err),
            "client is not allowed to use refresh_token grant type, allowed grant types: authorization_code"
        );
    }

    #[tokio::test]
    async fn test_server_supported_set_limits_clients() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let auth =
            ClientAuthenticator::new(store, vec![GrantType::AuthorizationCode], Span::none());
        let web = client(
            TokenEndpointAuthMethod::None,
            "",
            &["authorization_code", "refresh_token"],
        );

        assert!(auth.authorize_grant(&web, "authorization_code").is_ok());
        let err = auth.authorize_grant(&web, "refresh_token").unwrap_err();
        assert_eq!(
            description(err),
            "grant_type must be one of authorization_code, not refresh_token"
        );
    }
}
