//! PKCE verification (RFC 7636 §4.6)

use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::TokenError;

/// Check `code_verifier` against the challenge recorded at authorization time.
///
/// No recorded challenge means the code was issued without PKCE and any
/// verifier (including none) passes.
pub fn verify(challenge: &str, method: &str, code_verifier: &str) -> Result<(), TokenError> {
    if challenge.is_empty() {
        return Ok(());
    }

    let expected = match method {
        "S256" => s256_challenge(code_verifier),
        "plain" => code_verifier.to_string(),
        _ => {
            return Err(TokenError::invalid_request(
                "code_challenge_method must be S256 or plain",
            ));
        }
    };

    if bool::from(expected.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        Err(TokenError::invalid_request("code_verifier is invalid"))
    }
}

/// BASE64URL-NOPAD(SHA256(verifier))
pub fn s256_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
