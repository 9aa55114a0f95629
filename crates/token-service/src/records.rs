//! Records the token endpoint reads and writes through the record store.
//!
//! Every record is namespace-scoped and carries its own `namespace`/`name`
//! pair, so the store can derive the key from the serialized form.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Secondary index used to find an authorization request by its hashed code.
pub const HASHED_AUTH_CODE_FIELD: &str = "hashed_auth_code";

/// Namespace-qualified record name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub namespace: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The kinds of record this service touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "oauth_clients")]
    OAuthClient,
    #[serde(rename = "oauth_auth_requests")]
    OAuthAuthRequest,
    #[serde(rename = "oauth_tokens")]
    OAuthToken,
}

impl RecordKind {
    /// Fields the store keeps a secondary index for.
    pub fn indexed_fields(self) -> &'static [&'static str] {
        match self {
            RecordKind::OAuthAuthRequest => &[HASHED_AUTH_CODE_FIELD],
            RecordKind::OAuthClient | RecordKind::OAuthToken => &[],
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::OAuthClient => "oauth client",
            RecordKind::OAuthAuthRequest => "oauth auth request",
            RecordKind::OAuthToken => "oauth token",
        };
        f.write_str(name)
    }
}

/// A typed record stored under a [`RecordKind`].
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: RecordKind;

    fn key(&self) -> RecordKey;
}

/// How a client authenticates at the token endpoint (RFC 7591 §2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    pub fn requires_secret(self) -> bool {
        matches!(
            self,
            TokenEndpointAuthMethod::ClientSecretBasic | TokenEndpointAuthMethod::ClientSecretPost
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenEndpointAuthMethod::None => "none",
            TokenEndpointAuthMethod::ClientSecretBasic => "client_secret_basic",
            TokenEndpointAuthMethod::ClientSecretPost => "client_secret_post",
        }
    }
}

/// Reference to the identity provider that authenticated a user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    pub namespace: String,
    pub name: String,
}

impl ProviderRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A registered OAuth client. Read-only here; managed externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub namespace: String,
    pub name: String,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    /// bcrypt hash of the client secret (empty for public clients)
    #[serde(default)]
    pub client_secret_hash: String,
    /// Grant types this client may use
    #[serde(default)]
    pub grant_types: Vec<String>,
}

impl OAuthClient {
    /// The wire form of the client identifier, `namespace:name`
    pub fn client_id(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }
}

impl Record for OAuthClient {
    const KIND: RecordKind = RecordKind::OAuthClient;

    fn key(&self) -> RecordKey {
        RecordKey::new(&self.namespace, &self.name)
    }
}

/// A pending authorization, created when the user approved a client and
/// consumed exactly once by the code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAuthRequest {
    pub namespace: String,
    pub name: String,
    /// SHA-256 hex digest of the issued authorization code
    pub hashed_auth_code: String,
    #[serde(default)]
    pub code_challenge: String,
    #[serde(default)]
    pub code_challenge_method: String,
    pub provider: ProviderRef,
    pub user_id: String,
    /// Name of the client the code was issued to, when the authorization leg recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthAuthRequest {
    /// Whether this request may still be redeemed by `client_name` at `now`.
    pub fn redeemable_by(&self, client_name: &str, now: DateTime<Utc>) -> bool {
        let client_matches = self.client_id.as_deref().is_none_or(|id| id == client_name);
        let unexpired = self.expires_at.is_none_or(|at| at > now);
        client_matches && unexpired
    }
}

impl Record for OAuthAuthRequest {
    const KIND: RecordKind = RecordKind::OAuthAuthRequest;

    fn key(&self) -> RecordKey {
        RecordKey::new(&self.namespace, &self.name)
    }
}

/// A refresh token grant. `name` is the SHA-256 hex digest of the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub namespace: String,
    pub name: String,
    /// Name of the issuing client within `namespace`
    pub client_id: String,
    pub user_id: String,
    pub provider: ProviderRef,
    pub created_at: DateTime<Utc>,
}

impl Record for OAuthToken {
    const KIND: RecordKind = RecordKind::OAuthToken;

    fn key(&self) -> RecordKey {
        RecordKey::new(&self.namespace, &self.name)
    }
}
