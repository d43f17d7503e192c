//! Bearer tokens that let the node talk to remote storage endpoints.
//!
//! The token is an HS256 JWT whose only claim is the list of granted
//! permissions. The signing key is the base64-decoded shared storage secret.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hex::encode as hex_encode;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

/// The only scope issued to storage clients.
pub const ADMIN_PERMISSION: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtPayload {
    #[serde(rename = "Allow")]
    pub allow: Vec<String>,
}

/// Outgoing headers carrying the storage bearer token.
#[derive(Debug, Clone)]
pub struct StorageAuth(HeaderMap);

impl StorageAuth {
    pub fn headers(&self) -> &HeaderMap {
        &self.0
    }

    pub fn into_headers(self) -> HeaderMap {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum StorageAuthError {
    #[error("no api key provided")]
    EmptySecret,
    #[error("decoding api key: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("signing storage token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
    #[error("building authorization header: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("authorization header is missing or not a bearer token")]
    MissingBearer,
}

/// Signs an admin-scoped token with `secret` and wraps it as headers.
pub fn storage_auth(secret: &str) -> Result<StorageAuth, StorageAuthError> {
    let key = decode_secret(secret)?;
    let payload = JwtPayload {
        allow: vec![ADMIN_PERMISSION.to_string()],
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &payload,
        &EncodingKey::from_secret(&key),
    )?;

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );
    Ok(StorageAuth(headers))
}

/// Verifies the bearer token in `headers` against `secret` and returns the
/// permissions it grants.
pub fn verify_storage_token(
    secret: &str,
    headers: &HeaderMap,
) -> Result<Vec<String>, StorageAuthError> {
    let key = decode_secret(secret)?;
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StorageAuthError::MissingBearer)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;

    let data =
        jsonwebtoken::decode::<JwtPayload>(token, &DecodingKey::from_secret(&key), &validation)?;
    Ok(data.claims.allow)
}

/// Short, log-safe identifier for a secret.
pub fn secret_fingerprint(secret: &str) -> String {
    if secret.is_empty() {
        return "<empty>".to_string();
    }
    let mut hasher = Sha3_256::new();
    hasher.update(secret.as_bytes());
    hex_encode(hasher.finalize())[..12].to_string()
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, StorageAuthError> {
    if secret.is_empty() {
        return Err(StorageAuthError::EmptySecret);
    }
    Ok(STANDARD.decode(secret)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    // base64("provider-node-shared-secret")
    const SECRET: &str = "cHJvdmlkZXItbm9kZS1zaGFyZWQtc2VjcmV0";

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            storage_auth("").unwrap_err(),
            StorageAuthError::EmptySecret
        ));
    }

    #[test]
    fn non_base64_secret_fails_to_decode() {
        assert!(matches!(
            storage_auth("not base64!").unwrap_err(),
            StorageAuthError::Decode(_)
        ));
    }

    #[test]
    fn token_grants_exactly_admin() {
        let auth = storage_auth(SECRET).expect("token issued");
        let header = auth
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .expect("authorization header");
        assert!(header.starts_with("Bearer "));
        assert!(header.len() > "Bearer ".len());

        let permissions = verify_storage_token(SECRET, auth.headers()).expect("token verifies");
        assert_eq!(permissions, vec![ADMIN_PERMISSION.to_string()]);
    }

    #[test]
    fn token_does_not_verify_under_another_secret() {
        let auth = storage_auth(SECRET).expect("token issued");
        // base64("some-other-secret")
        let err = verify_storage_token("c29tZS1vdGhlci1zZWNyZXQ=", auth.headers()).unwrap_err();
        assert!(matches!(err, StorageAuthError::Sign(_)));
    }

    #[test]
    fn verification_requires_bearer_header() {
        let err = verify_storage_token(SECRET, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, StorageAuthError::MissingBearer));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(secret_fingerprint(SECRET), secret_fingerprint(SECRET));
        assert_eq!(secret_fingerprint(SECRET).len(), 12);
        assert_eq!(secret_fingerprint(""), "<empty>");
    }
}
