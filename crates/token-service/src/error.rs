//! Token endpoint errors and their OAuth2 wire form (RFC 6749 §5.2)

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Missing, malformed, or wrong client credentials. Deliberately vague.
    #[error("Invalid client credentials")]
    InvalidClient,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{context}: {source}")]
    Provider {
        context: &'static str,
        #[source]
        source: ProviderError,
    },
}

impl TokenError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        TokenError::InvalidRequest(description.into())
    }

    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| TokenError::Store { context, source }
    }

    pub fn provider(context: &'static str) -> impl FnOnce(ProviderError) -> Self {
        move |source| TokenError::Provider { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TokenError::InvalidClient => StatusCode::UNAUTHORIZED,
            TokenError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            TokenError::Store { .. } | TokenError::Provider { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error body returned by the token endpoint
#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            TokenError::InvalidClient => OAuthErrorBody {
                error: "invalid_client",
                error_description: self.to_string(),
            },
            TokenError::InvalidRequest(description) => OAuthErrorBody {
                error: "invalid_request",
                error_description: description.clone(),
            },
            TokenError::Store { .. } | TokenError::Provider { .. } => {
                tracing::error!("Token request failed: {}", self);
                OAuthErrorBody {
                    error: "server_error",
                    error_description: "The server could not issue a token".to_string(),
                }
            }
        };

        let mut response = (
            status,
            [(header::CACHE_CONTROL, "no-store")],
            Json(body),
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordKey;
    use crate::records::RecordKind;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_request_body() {
        let response = TokenError::invalid_request("code is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["error_description"], "code is required");
    }

    #[tokio::test]
    async fn test_invalid_client_challenges_basic() {
        let response = TokenError::InvalidClient.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic");
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_client");
        assert_eq!(body["error_description"], "Invalid client credentials");
    }

    #[tokio::test]
    async fn test_server_error_hides_store_detail() {
        let err = TokenError::store("failed to create oauth token")(StoreError::AlreadyExists {
            kind: RecordKind::OAuthToken,
            key: RecordKey::new("acme", "deadbeef"),
        });
        assert!(err.to_string().contains("deadbeef"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "server_error");
        assert!(!body.to_string().contains("deadbeef"));
    }
}
