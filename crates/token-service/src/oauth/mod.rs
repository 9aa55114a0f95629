//! OAuth2 token issuance
//!
//! Implements:
//! - RFC 6749 token endpoint (authorization_code and refresh_token grants)
//! - RFC 7636 PKCE verification
//! - RFC 8414 metadata discovery for the token endpoint

pub mod authorization_code;
pub mod client_auth;
pub mod credentials;
pub mod grant;
pub mod issue;
pub mod metadata;
pub mod pkce;
pub mod refresh;
pub mod token;
