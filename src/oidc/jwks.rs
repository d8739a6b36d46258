//! Issuer JSON Web Key Sets and the in-memory cache used to verify logout tokens.

use super::jwt::{JwtError, verify_rs256};
use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::{
    Client,
    header::{ETAG, IF_NONE_MATCH},
};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{Instrument, info, info_span, warn};
use url::Url;

// Remote key sets are cached with a TTL and refreshed when stale or when a
// token names an unknown kid. A failed refresh keeps the last good set.
const KEYSET_CACHE_TTL_SECONDS: u64 = 300;
const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS from JSON.
    ///
    /// # Errors
    /// Returns an error if `s` is not a JWKS document.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Single-key set holding the public half of `private_key`.
    #[must_use]
    pub fn from_rsa_private_key(private_key: &RsaPrivateKey, kid: impl Into<String>) -> Self {
        let public_key = RsaPublicKey::from(private_key);
        Self {
            keys: vec![Jwk::from_rsa_public_key(&public_key, kid)],
        }
    }
}

/// One key of a provider key set. Non-RSA keys are kept but never used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: Some(kid.into()),
            n: Some(Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be())),
            e: Some(Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be())),
        }
    }

    /// Convert this JWK to an `RsaPublicKey`.
    ///
    /// # Errors
    /// Returns an error if the key is not an RSA signing key or its modulus and
    /// exponent do not decode.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, JwtError> {
        if self.kty != "RSA" || self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(JwtError::KeyType);
        }
        let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
            return Err(JwtError::KeyType);
        };
        let n_bytes = Base64UrlUnpadded::decode_vec(n).map_err(|_| JwtError::Base64)?;
        let e_bytes = Base64UrlUnpadded::decode_vec(e).map_err(|_| JwtError::Base64)?;
        RsaPublicKey::new(
            BigUint::from_bytes_be(&n_bytes),
            BigUint::from_bytes_be(&e_bytes),
        )
        .map_err(JwtError::Rsa)
    }
}

#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("invalid key set URL: {0}")]
    InvalidUrl(String),
    #[error("key set URL must use https: {0}")]
    InsecureUrl(String),
    #[error("key set request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("key set fetch failed: {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid key set JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
enum KeysetSource {
    /// Loaded from a file at startup and never refreshed.
    Static,
    /// Fetched from the issuer's published `jwks_uri`.
    Remote { url: String, client: Client },
}

#[derive(Debug, Clone)]
struct KeysetCache {
    jwks: Jwks,
    fetched_at: Instant,
    etag: Option<String>,
}

impl KeysetCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Ok,
    Error,
    Static,
}

impl DependencyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Static => "static",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Cached verification keys of the identity provider.
#[derive(Debug)]
pub struct IssuerKeys {
    source: KeysetSource,
    cache: RwLock<KeysetCache>,
    last_refresh_unix: AtomicU64,
}

impl IssuerKeys {
    #[must_use]
    pub fn new_static(jwks: Jwks) -> Self {
        Self {
            source: KeysetSource::Static,
            cache: RwLock::new(KeysetCache {
                jwks,
                fetched_at: Instant::now(),
                etag: None,
            }),
            last_refresh_unix: AtomicU64::new(0),
        }
    }

    /// Build a cache backed by the issuer's `jwks_uri`.
    ///
    /// The startup fetch is best-effort: on failure the cache starts empty and
    /// stale, so verification fails closed until a refresh succeeds.
    ///
    /// # Errors
    /// Returns an error if `url` is not a valid https URL.
    pub async fn new_remote(url: String, client: Client) -> Result<Self, KeySetError> {
        let parsed = Url::parse(&url).map_err(|err| KeySetError::InvalidUrl(err.to_string()))?;
        if parsed.scheme() != "https" {
            return Err(KeySetError::InsecureUrl(url));
        }

        let (jwks, fetched_at, last_refresh_unix, etag) =
            match fetch_jwks(&client, &url, None).await {
                Ok(FetchOutcome::Updated { jwks, etag }) => {
                    (jwks, Instant::now(), now_unix_seconds_u64(), etag)
                }
                Ok(FetchOutcome::NotModified) => {
                    warn!("issuer key set fetch returned not-modified during startup");
                    (Jwks::default(), stale_instant(), 0, None)
                }
                Err(err) => {
                    warn!(
                        url = %url,
                        error = %err,
                        "issuer key set fetch failed during startup; continuing with empty key set"
                    );
                    (Jwks::default(), stale_instant(), 0, None)
                }
            };

        Ok(Self {
            source: KeysetSource::Remote { url, client },
            cache: RwLock::new(KeysetCache {
                jwks,
                fetched_at,
                etag,
            }),
            last_refresh_unix: AtomicU64::new(last_refresh_unix),
        })
    }

    /// Verify an RS256 token and decode its claims.
    ///
    /// On an unknown `kid` the set is refreshed once (rate limited) and the
    /// token checked again, which picks up provider key rotation.
    ///
    /// # Errors
    /// Returns the [`JwtError`] of the last verification attempt.
    pub async fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, JwtError> {
        let jwks = self.snapshot().await;
        match verify_rs256(token, &jwks) {
            Err(JwtError::UnknownKid(kid)) => {
                if self.refresh_on_unknown_kid().await {
                    let jwks = self.snapshot().await;
                    verify_rs256(token, &jwks)
                } else {
                    Err(JwtError::UnknownKid(kid))
                }
            }
            result => result,
        }
    }

    /// Key set snapshot; refreshes when stale and keeps the cache if that fails.
    pub async fn snapshot(&self) -> Jwks {
        let (cached, fresh) = {
            let cache = self.cache.read().await;
            (cache.jwks.clone(), cache.is_fresh())
        };
        if fresh {
            return cached;
        }

        if let KeysetSource::Remote { url, .. } = &self.source
            && let Err(err) = self.refresh().await
        {
            warn!(error = %err, url = %url, "failed to refresh issuer key set");
            return cached;
        }

        self.cache.read().await.jwks.clone()
    }

    async fn refresh(&self) -> Result<(), KeySetError> {
        let (url, client, etag) = match &self.source {
            KeysetSource::Static => return Ok(()),
            KeysetSource::Remote { url, client } => {
                let etag = self.cache.read().await.etag.clone();
                (url.clone(), client.clone(), etag)
            }
        };

        match fetch_jwks(&client, &url, etag.as_deref()).await? {
            FetchOutcome::NotModified => {
                self.cache.write().await.fetched_at = Instant::now();
            }
            FetchOutcome::Updated { jwks, etag } => {
                let mut cache = self.cache.write().await;
                cache.jwks = jwks;
                cache.fetched_at = Instant::now();
                cache.etag = etag;
                info!(keys = cache.jwks.keys.len(), "issuer key set cache refreshed");
            }
        }
        Ok(())
    }

    async fn refresh_on_unknown_kid(&self) -> bool {
        if matches!(&self.source, KeysetSource::Static) {
            return false;
        }
        let now = now_unix_seconds_u64();
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            return false;
        }
        self.last_refresh_unix.store(now, Ordering::Relaxed);
        match self.refresh().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "issuer key set refresh on unknown kid failed");
                false
            }
        }
    }

    /// Report key set health for `/health` by attempting a refresh.
    pub async fn dependency_status(&self) -> DependencyStatus {
        match &self.source {
            KeysetSource::Static => DependencyStatus::Static,
            KeysetSource::Remote { url, .. } => match self.refresh().await {
                Ok(()) => DependencyStatus::Ok,
                Err(err) => {
                    warn!(
                        error = %err,
                        url = %url,
                        "issuer key set fetch failed during health check"
                    );
                    DependencyStatus::Error
                }
            },
        }
    }
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn now_unix_seconds_u64() -> u64 {
    u64::try_from(now_unix_seconds()).unwrap_or(0)
}

fn stale_instant() -> Instant {
    Instant::now()
        .checked_sub(Duration::from_secs(KEYSET_CACHE_TTL_SECONDS + 1))
        .unwrap_or_else(Instant::now)
}

enum FetchOutcome {
    NotModified,
    Updated { jwks: Jwks, etag: Option<String> },
}

async fn fetch_jwks(
    client: &Client,
    url: &str,
    etag: Option<&str>,
) -> Result<FetchOutcome, KeySetError> {
    let span = info_span!("oidc.jwks.fetch", http.method = "GET", url = %url);
    async {
        let mut request = client.get(url);
        if let Some(etag_value) = etag {
            request = request.header(IF_NONE_MATCH, etag_value);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(KeySetError::Status(status));
        }

        let jwks = Jwks::from_json(&body)?;
        Ok(FetchOutcome::Updated { jwks, etag })
    }
    .instrument(span)
    .await
}
