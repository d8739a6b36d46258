//! Back-channel logout token verification.
//!
//! Checks run in a fixed order and the first failure wins: token shape,
//! signature, issuer, audience, freshness, subject, then the logout event.

use super::{
    jwks::{IssuerKeys, now_unix_seconds},
    jwt::JwtError,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// Reasons a logout token is refused. Logged only; callers always see 401.
#[derive(Debug, Error)]
pub enum LogoutTokenError {
    #[error("logout token missing")]
    Missing,
    #[error("malformed logout token: {0}")]
    Malformed(#[source] JwtError),
    #[error("logout token signature rejected: {0}")]
    BadSignature(#[source] JwtError),
    #[error("unexpected issuer: {0:?}")]
    WrongIssuer(Option<String>),
    #[error("unexpected audience")]
    WrongAudience,
    #[error("logout token has no iat claim")]
    MissingIssuedAt,
    #[error("logout token is stale: issued {age}s ago")]
    Stale { age: i64 },
    #[error("logout token issued in the future")]
    IssuedInFuture,
    #[error("logout token expired")]
    Expired,
    #[error("logout token has no subject")]
    MissingSubject,
    #[error("logout token has no backchannel logout event")]
    MissingLogoutEvent,
    #[error("backchannel logout event must be an empty object")]
    InvalidLogoutEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutTokenClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub events: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLogout {
    pub subject_id: String,
    pub jti: Option<String>,
    pub sid: Option<String>,
}

#[derive(Debug)]
pub struct LogoutTokenVerifier {
    keys: Arc<IssuerKeys>,
    issuer: String,
    audience: String,
    max_age: Duration,
    clock_skew: Duration,
}

impl LogoutTokenVerifier {
    #[must_use]
    pub fn new(keys: Arc<IssuerKeys>, issuer: String, audience: String) -> Self {
        Self {
            keys,
            issuer,
            audience,
            max_age: Duration::from_secs(120),
            clock_skew: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn keys(&self) -> &IssuerKeys {
        &self.keys
    }

    /// Verify `token` against the current time.
    ///
    /// # Errors
    /// Returns the first failed check.
    pub async fn verify(&self, token: Option<&str>) -> Result<VerifiedLogout, LogoutTokenError> {
        self.verify_at(token, now_unix_seconds()).await
    }

    /// Verify `token` as of `now` (unix seconds).
    ///
    /// # Errors
    /// Returns the first failed check.
    pub async fn verify_at(
        &self,
        token: Option<&str>,
        now: i64,
    ) -> Result<VerifiedLogout, LogoutTokenError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(LogoutTokenError::Missing)?;

        let claims: LogoutTokenClaims = self.keys.verify(token).await.map_err(|err| {
            if err.is_malformed() {
                LogoutTokenError::Malformed(err)
            } else {
                LogoutTokenError::BadSignature(err)
            }
        })?;

        self.check_claims(claims, now)
    }

    fn check_claims(
        &self,
        claims: LogoutTokenClaims,
        now: i64,
    ) -> Result<VerifiedLogout, LogoutTokenError> {
        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(LogoutTokenError::WrongIssuer(claims.iss));
        }

        if !claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.audience))
        {
            return Err(LogoutTokenError::WrongAudience);
        }

        let skew = seconds(self.clock_skew);
        let iat = claims.iat.ok_or(LogoutTokenError::MissingIssuedAt)?;
        if iat > now.saturating_add(skew) {
            return Err(LogoutTokenError::IssuedInFuture);
        }
        let age = now.saturating_sub(iat);
        if age > seconds(self.max_age).saturating_add(skew) {
            return Err(LogoutTokenError::Stale { age });
        }
        if let Some(exp) = claims.exp
            && exp.saturating_add(skew) <= now
        {
            return Err(LogoutTokenError::Expired);
        }

        let subject_id = claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or(LogoutTokenError::MissingSubject)?;

        let event = claims
            .events
            .as_ref()
            .and_then(|events| events.get(BACKCHANNEL_LOGOUT_EVENT))
            .ok_or(LogoutTokenError::MissingLogoutEvent)?;
        if !event.as_object().is_some_and(Map::is_empty) {
            return Err(LogoutTokenError::InvalidLogoutEvent);
        }

        Ok(VerifiedLogout {
            subject_id,
            jti: claims.jti,
            sid: claims.sid,
        })
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
