//! Client credential resolution (RFC 6749 §2.3.1)
//!
//! Credentials come from the `client_id`/`client_secret` form fields when
//! `client_id` is present, otherwise from HTTP Basic auth.

use std::fmt;

use axum::http::{header, HeaderMap};
use base64::Engine;

use crate::error::TokenError;
use crate::records::RecordKey;

/// A client identifier of the form `namespace:name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId {
    pub namespace: String,
    pub name: String,
}

impl ClientId {
    /// Split on the first colon. Both halves must be non-empty.
    pub fn parse(client_id: &str) -> Result<Self, TokenError> {
        match client_id.split_once(':') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => Ok(Self {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            _ => Err(TokenError::invalid_request("client_id is invalid")),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.namespace, &self.name)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// The client identity and secret presented with a token request
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: ClientId,
    pub secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Resolve client credentials from the form fields or the Authorization header.
///
/// Empty form values count as absent.
pub fn resolve(
    headers: &HeaderMap,
    form_client_id: &str,
    form_client_secret: &str,
) -> Result<ClientCredentials, TokenError> {
    let (client_id, secret) = if form_client_id.is_empty() {
        from_basic_auth(headers)?
    } else {
        (form_client_id.to_string(), form_client_secret.to_string())
    };

    Ok(ClientCredentials {
        client_id: ClientId::parse(&client_id)?,
        secret,
    })
}

fn from_basic_auth(headers: &HeaderMap) -> Result<(String, String), TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(TokenError::InvalidClient)?;

    let encoded = match value.trim().split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("basic") => rest.trim(),
        _ => return Err(TokenError::InvalidClient),
    };
    if encoded.is_empty() {
        return Err(TokenError::InvalidClient);
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| TokenError::InvalidClient)?;
    let decoded = String::from_utf8(decoded).map_err(|_| TokenError::InvalidClient)?;

    // Secrets may contain colons, ids may not
    let (client_id, secret) = decoded.rsplit_once(':').ok_or(TokenError::InvalidClient)?;
    if client_id.is_empty() {
        return Err(TokenError::invalid_request("client_id is required"));
    }

    if !well_formed_escapes(client_id) {
        return Err(TokenError::invalid_request("client_id is invalid"));
    }
    let client_id = urlencoding::decode(&client_id.replace('+', " "))
        .map_err(|_| TokenError::invalid_request("client_id is invalid"))?
        .into_owned();

    Ok((client_id, secret.to_string()))
}

/// Every `%` must start a two-hex-digit escape.
fn well_formed_escapes(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1..i + 3) {
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}
