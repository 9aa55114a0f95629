//! `authorization_code` grant: one-time code exchange with PKCE

use std::sync::Arc;

use chrono::Utc;
use tracing::Span;

use crate::error::TokenError;
use crate::oauth::issue::TokenIssuer;
use crate::oauth::pkce;
use crate::oauth::token::TokenResponse;
use crate::records::{OAuthAuthRequest, OAuthClient, Record, HASHED_AUTH_CODE_FIELD};
use crate::storage::{hash_token, RecordStore};

pub struct AuthorizationCodeExchanger {
    store: Arc<dyn RecordStore>,
    issuer: Arc<TokenIssuer>,
    span: Span,
}

impl AuthorizationCodeExchanger {
    pub fn new(store: Arc<dyn RecordStore>, issuer: Arc<TokenIssuer>, span: Span) -> Self {
        Self {
            store,
            issuer,
            span,
        }
    }

    #[tracing::instrument(
        name = "authorization_code",
        parent = &self.span,
        skip_all,
        fields(client = %client.client_id())
    )]
    pub async fn exchange(
        &self,
        client: &OAuthClient,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, TokenError> {
        if code.is_empty() {
            return Err(TokenError::invalid_request("code is required"));
        }

        let mut matches: Vec<OAuthAuthRequest> = self
            .store
            .list_records_by_field(&client.namespace, HASHED_AUTH_CODE_FIELD, &hash_token(code))
            .await
            .map_err(TokenError::store("failed to look up auth request"))?;
        if matches.len() > 1 {
            tracing::warn!("{} auth requests share one code hash", matches.len());
        }
        let auth_request = match matches.pop() {
            Some(auth_request) if matches.is_empty() => auth_request,
            _ => return Err(TokenError::invalid_request("code is invalid")),
        };

        // Authorization codes are one-time use
        match self.store.delete_record(&auth_request).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!("Auth request {} was consumed concurrently", auth_request.key());
                return Err(TokenError::invalid_request("code is invalid"));
            }
            Err(e) => {
                // The lookup already proved the code valid; don't fail the exchange
                tracing::warn!("Failed to delete auth request {}: {}", auth_request.key(), e);
            }
        }

        if !auth_request.redeemable_by(&client.name, Utc::now()) {
            tracing::warn!("Auth request {} is expired or bound to another client", auth_request.key());
            return Err(TokenError::invalid_request("code is invalid"));
        }

        pkce::verify(
            &auth_request.code_challenge,
            &auth_request.code_challenge_method,
            code_verifier,
        )?;

        let response = self
            .issuer
            .issue(client, &auth_request.provider, &auth_request.user_id)
            .await?;

        tracing::info!(
            "Exchanged authorization code for user {} via {}",
            auth_request.user_id,
            auth_request.provider
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::pkce::s256_challenge;
    use crate::provider::LocalIdentityProvider;
    use crate::records::{OAuthToken, ProviderRef, RecordKey, TokenEndpointAuthMethod};
    use crate::storage::LocalStore;
    use chrono::Duration;

    fn github() -> ProviderRef {
        ProviderRef::new("default", "github")
    }

    fn web_client() -> OAuthClient {
        OAuthClient {
            namespace: "acme".to_string(),
            name: "web".to_string(),
            token_endpoint_auth_method: TokenEndpointAuthMethod::None,
            client_secret_hash: String::new(),
            grant_types: vec!["authorization_code".to_string()],
        }
    }

    fn auth_request(code: &str, challenge: &str, method: &str) -> OAuthAuthRequest {
        OAuthAuthRequest {
            namespace: "acme".to_string(),
            name: format!("req-{}", code),
            hashed_auth_code: hash_token(code),
            code_challenge: challenge.to_string(),
            code_challenge_method: method.to_string(),
            provider: github(),
            user_id: "user-1".to_string(),
            client_id: None,
            expires_at: None,
        }
    }

    fn exchanger(store: Arc<dyn RecordStore>) -> AuthorizationCodeExchanger {
        let provider = Arc::new(LocalIdentityProvider::new([github()]));
        let issuer = Arc::new(TokenIssuer::new(store.clone(), provider, Duration::hours(1)));
        AuthorizationCodeExchanger::new(store, issuer, Span::none())
    }

    fn description(err: TokenError) -> String {
        match err {
            TokenError::InvalidRequest(d) => d,
            other => panic!("expected invalid_request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_persists_hashed_refresh_token() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        store
            .create_record(&auth_request("abc123", &s256_challenge("xyz"), "S256"))
            .await
            .unwrap();

        let response = exchanger(store.clone())
            .exchange(&web_client(), "abc123", "xyz")
            .await
            .unwrap();

        assert_eq!(response.token_type, "bearer");
        assert!(response.expires_in > 3590 && response.expires_in <= 3600);

        let stored: OAuthToken = store
            .get_record(&RecordKey::new("acme", hash_token(&response.refresh_token)))
            .await
            .unwrap();
        assert_eq!(stored.client_id, "web");
        assert_eq!(stored.user_id, "user-1");
        assert_eq!(stored.provider, github());
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        store.create_record(&auth_request("abc123", "", "")).await.unwrap();
        let exchanger = exchanger(store);

        exchanger.exchange(&web_client(), "abc123", "").await.unwrap();
        let err = exchanger.exchange(&web_client(), "abc123", "").await.unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_empty_and_unknown_codes() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let exchanger = exchanger(store);

        let err = exchanger.exchange(&web_client(), "", "").await.unwrap_err();
        assert_eq!(description(err), "code is required");

        let err = exchanger.exchange(&web_client(), "nope", "").await.unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_duplicate_code_hash_is_invalid() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let mut second = auth_request("dup", "", "");
        second.name = "req-dup-2".to_string();
        store.create_record(&auth_request("dup", "", "")).await.unwrap();
        store.create_record(&second).await.unwrap();

        let err = exchanger(store)
            .exchange(&web_client(), "dup", "")
            .await
            .unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_code_from_other_namespace_is_invalid() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let mut foreign = auth_request("abc123", "", "");
        foreign.namespace = "other".to_string();
        store.create_record(&foreign).await.unwrap();

        let err = exchanger(store)
            .exchange(&web_client(), "abc123", "")
            .await
            .unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_pkce_failure_still_consumes_code() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        store
            .create_record(&auth_request("abc123", &s256_challenge("xyz"), "S256"))
            .await
            .unwrap();
        let exchanger = exchanger(store);

        let err = exchanger.exchange(&web_client(), "abc123", "wrong").await.unwrap_err();
        assert_eq!(description(err), "code_verifier is invalid");

        let err = exchanger.exchange(&web_client(), "abc123", "xyz").await.unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_code_bound_to_other_client_is_invalid() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let mut bound = auth_request("abc123", "", "");
        bound.client_id = Some("cli".to_string());
        store.create_record(&bound).await.unwrap();

        let err = exchanger(store)
            .exchange(&web_client(), "abc123", "")
            .await
            .unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_expired_code_is_invalid() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let mut expired = auth_request("abc123", "", "");
        expired.expires_at = Some(Utc::now() - Duration::minutes(1));
        store.create_record(&expired).await.unwrap();

        let err = exchanger(store)
            .exchange(&web_client(), "abc123", "")
            .await
            .unwrap_err();
        assert_eq!(description(err), "code is invalid");
    }

    #[tokio::test]
    async fn test_unknown_provider_is_server_error() {
        let store: Arc<dyn RecordStore> = Arc::new(LocalStore::in_memory());
        let mut request = auth_request("abc123", "", "");
        request.provider = ProviderRef::new("default", "okta");
        store.create_record(&request).await.unwrap();

        let err = exchanger(store)
            .exchange(&web_client(), "abc123", "")
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Provider { .. }));
    }
}
