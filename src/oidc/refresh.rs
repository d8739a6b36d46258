//! Keeps the session's access token usable for downstream calls.

use super::{
    assertion::{CLIENT_ASSERTION_TYPE, ClientAssertionSigner},
    jwks::now_unix_seconds,
    jwt::{JwtError, decode_claims_unverified},
};
use crate::session::TokenSet;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, info_span, warn};

pub const FAILED_TO_REFRESH_TOKEN: &str = "FAILED_TO_REFRESH_TOKEN";

pub const MAX_REFRESH_ATTEMPTS: u32 = 2;

const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Failure of a single call to the token endpoint.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("token endpoint unreachable: {0}")]
    Transport(String),
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    /// Transport failures and transient statuses may succeed on a second try.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => RETRYABLE_STATUSES.contains(status),
            Self::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("FAILED_TO_REFRESH_TOKEN: {0}")]
    Exchange(#[source] ExchangeError),
    #[error("FAILED_TO_REFRESH_TOKEN: could not sign client assertion: {0}")]
    Assertion(#[source] JwtError),
}

impl RefreshError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        FAILED_TO_REFRESH_TOKEN
    }
}

/// Provider refresh grant.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(
        &self,
        refresh_token: &SecretString,
        client_assertion: &str,
    ) -> Result<TokenResponse, ExchangeError>;

    /// Audience for client assertions sent to this endpoint.
    fn audience(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: Client,
    url: String,
}

impl HttpTokenEndpoint {
    #[must_use]
    pub const fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn refresh(
        &self,
        refresh_token: &SecretString,
        client_assertion: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        let span = info_span!("oidc.token.refresh", http.method = "POST", url = %self.url);
        async {
            let form = [
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", client_assertion),
            ];
            let response = self
                .client
                .post(&self.url)
                .form(&form)
                .send()
                .await
                .map_err(|err| ExchangeError::Transport(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ExchangeError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            response
                .json::<TokenResponse>()
                .await
                .map_err(|err| ExchangeError::InvalidResponse(err.to_string()))
        }
        .instrument(span)
        .await
    }

    fn audience(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Access token still valid, nothing was sent.
    Fresh,
    Refreshed,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// True when `access_token` carries an `exp` in the future.
///
/// Tokens that cannot be decoded or lack `exp` count as expired.
#[must_use]
pub fn is_access_token_valid(access_token: &str, now: i64) -> bool {
    match decode_claims_unverified::<ExpiryClaims>(access_token) {
        Ok(ExpiryClaims { exp: Some(exp) }) => exp > now,
        Ok(ExpiryClaims { exp: None }) => false,
        Err(err) => {
            debug!("access token could not be decoded, treating as expired: {err}");
            false
        }
    }
}

/// Refreshes expired access tokens through the provider's refresh grant.
pub struct AccessTokenRefresher {
    endpoint: Arc<dyn TokenEndpoint>,
    assertions: ClientAssertionSigner,
}

impl std::fmt::Debug for AccessTokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenRefresher")
            .field("audience", &self.endpoint.audience())
            .field("assertions", &self.assertions)
            .finish()
    }
}

impl AccessTokenRefresher {
    #[must_use]
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, assertions: ClientAssertionSigner) -> Self {
        Self {
            endpoint,
            assertions,
        }
    }

    /// Make sure `tokens` holds an unexpired access token.
    ///
    /// # Errors
    /// Returns [`RefreshError`] after the attempts are exhausted; `tokens` is
    /// left untouched in that case.
    pub async fn ensure_fresh(&self, tokens: &mut TokenSet) -> Result<Freshness, RefreshError> {
        self.ensure_fresh_at(tokens, now_unix_seconds()).await
    }

    /// # Errors
    /// Returns [`RefreshError`] after the attempts are exhausted.
    pub async fn ensure_fresh_at(
        &self,
        tokens: &mut TokenSet,
        now: i64,
    ) -> Result<Freshness, RefreshError> {
        if is_access_token_valid(tokens.access_token.expose_secret(), now) {
            return Ok(Freshness::Fresh);
        }

        let response = self.exchange(&tokens.refresh_token).await?;

        tokens.access_token = SecretString::from(response.access_token);
        if let Some(refresh_token) = response.refresh_token {
            tokens.refresh_token = SecretString::from(refresh_token);
        }
        if let Some(id_token) = response.id_token {
            tokens.id_token = SecretString::from(id_token);
        }
        debug!("access token refreshed");
        Ok(Freshness::Refreshed)
    }

    async fn exchange(&self, refresh_token: &SecretString) -> Result<TokenResponse, RefreshError> {
        let mut attempt = 1;
        loop {
            let assertion = self
                .assertions
                .sign(self.endpoint.audience())
                .map_err(RefreshError::Assertion)?;

            match self.endpoint.refresh(refresh_token, &assertion).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < MAX_REFRESH_ATTEMPTS => {
                    warn!(attempt, "token refresh failed, retrying: {err}");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, "token refresh failed: {err}");
                    return Err(RefreshError::Exchange(err));
                }
            }
        }
    }
}
