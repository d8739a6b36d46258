//! Compact RS256 JWS signing and verification.
//!
//! Claim validation is left to callers; this module only proves a token was
//! signed by a key in the given [`Jwks`].

use super::jwks::Jwks;
use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, errors::Error as RsaError};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use thiserror::Error;

pub const RS256: &str = "RS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwtHeader {
    fn rs256(kid: &str) -> Self {
        Self {
            alg: RS256.to_string(),
            typ: Some("JWT".to_string()),
            kid: Some(kid.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("token has no key id and the key set is ambiguous")]
    MissingKid,
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("key is not an RSA signing key")]
    KeyType,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
}

impl JwtError {
    /// True for failures of the token's shape rather than of its signature.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::TokenFormat | Self::Base64 | Self::Json(_) | Self::UnsupportedAlg(_)
        )
    }
}

struct Parts<'a> {
    header: JwtHeader,
    header_b64: &'a str,
    claims_b64: &'a str,
    sig_b64: &'a str,
}

fn split(token: &str) -> Result<Parts<'_>, JwtError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(JwtError::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(JwtError::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(JwtError::TokenFormat)?;
    if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
        return Err(JwtError::TokenFormat);
    }
    let header = b64d_json(header_b64)?;
    Ok(Parts {
        header,
        header_b64,
        claims_b64,
        sig_b64,
    })
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, JwtError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, JwtError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| JwtError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Parse an RSA private key in PKCS#8 or PKCS#1, PEM or DER.
///
/// # Errors
/// Returns [`JwtError::KeyParse`] if none of the encodings match.
pub fn decode_private_key(pem_or_der: &[u8]) -> Result<RsaPrivateKey, JwtError> {
    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| JwtError::KeyParse)?;
        if let Ok(k) = RsaPrivateKey::from_pkcs8_pem(s) {
            return Ok(k);
        }
        if let Ok(k) = RsaPrivateKey::from_pkcs1_pem(s) {
            return Ok(k);
        }
        return Err(JwtError::KeyParse);
    }

    if let Ok(k) = RsaPrivateKey::from_pkcs8_der(pem_or_der) {
        return Ok(k);
    }
    if let Ok(k) = RsaPrivateKey::from_pkcs1_der(pem_or_der) {
        return Ok(k);
    }
    Err(JwtError::KeyParse)
}

/// Sign `claims` as an RS256 JWT with `kid` in the header.
///
/// # Errors
/// Returns an error if the claims cannot be encoded.
pub fn sign_rs256<C: Serialize>(
    private_key: &RsaPrivateKey,
    kid: &str,
    claims: &C,
) -> Result<String, JwtError> {
    let header_b64 = b64e_json(&JwtHeader::rs256(kid))?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an RS256 token against `jwks` and decode its claims.
///
/// Only `RS256` is accepted; `none` and every other algorithm are rejected
/// before any key is looked at.
///
/// # Errors
/// Returns an error if the token is malformed, its `kid` is not in `jwks`, or
/// the signature does not verify.
pub fn verify_rs256<C: DeserializeOwned>(token: &str, jwks: &Jwks) -> Result<C, JwtError> {
    let parts = split(token)?;
    if parts.header.alg != RS256 {
        return Err(JwtError::UnsupportedAlg(parts.header.alg));
    }

    let jwk = match parts.header.kid.as_deref() {
        Some(kid) => jwks
            .find_by_kid(kid)
            .ok_or_else(|| JwtError::UnknownKid(kid.to_string()))?,
        None => match jwks.keys.as_slice() {
            [only] => only,
            _ => return Err(JwtError::MissingKid),
        },
    };

    let public_key = jwk.to_rsa_public_key()?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signing_input = format!("{}.{}", parts.header_b64, parts.claims_b64);
    let signature_bytes =
        Base64UrlUnpadded::decode_vec(parts.sig_b64).map_err(|_| JwtError::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| JwtError::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwtError::InvalidSignature)?;

    b64d_json(parts.claims_b64)
}

/// Read the header of a token without verifying anything.
///
/// # Errors
/// Returns an error if the token is not a three-part JWS with a JSON header.
pub fn peek_header(token: &str) -> Result<JwtHeader, JwtError> {
    Ok(split(token)?.header)
}

/// Decode claims without checking the signature.
///
/// Only for tokens this service holds on the user's behalf (e.g. reading
/// `exp` from its own access token), never for tokens received from a peer.
///
/// # Errors
/// Returns an error if the token or its claims cannot be decoded.
pub fn decode_claims_unverified<C: DeserializeOwned>(token: &str) -> Result<C, JwtError> {
    b64d_json(split(token)?.claims_b64)
}
