//! `private_key_jwt` client assertions for the token endpoint.

use super::{
    jwks::now_unix_seconds,
    jwt::{JwtError, sign_rs256},
};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const ASSERTION_TTL_SECONDS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientAssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs single-use client assertions with the client's private key.
pub struct ClientAssertionSigner {
    client_id: String,
    key_id: String,
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for ClientAssertionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAssertionSigner")
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl ClientAssertionSigner {
    #[must_use]
    pub fn new(client_id: String, key_id: String, private_key: RsaPrivateKey) -> Self {
        Self {
            client_id,
            key_id,
            private_key,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Sign a fresh assertion for `audience` with a random `jti`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn sign(&self, audience: &str) -> Result<String, JwtError> {
        self.sign_at(audience, now_unix_seconds())
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn sign_at(&self, audience: &str, now: i64) -> Result<String, JwtError> {
        let claims = ClientAssertionClaims {
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            aud: audience.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ASSERTION_TTL_SECONDS,
        };
        sign_rs256(&self.private_key, &self.key_id, &claims)
    }
}
