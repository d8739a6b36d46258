//! Account management API calls made on behalf of the signed-in user.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, info_span};
use url::Url;

const AUTHENTICATE_PATH: &str = "authenticate";

#[derive(Debug, Error)]
pub enum AccountApiError {
    #[error("account API unreachable: {0}")]
    Transport(String),
    #[error("account API returned {0}")]
    Status(u16),
    #[error("invalid account API URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Re-checks the user's password before a journey may change account data.
#[async_trait]
pub trait PasswordCheck: Send + Sync {
    /// `Ok(false)` when the password is wrong.
    async fn authenticate(
        &self,
        access_token: &SecretString,
        email: Option<&str>,
        password: &SecretString,
    ) -> Result<bool, AccountApiError>;
}

#[derive(Serialize)]
struct AuthenticateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    password: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpAccountApi {
    client: Client,
    authenticate_url: Url,
}

impl HttpAccountApi {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL.
    pub fn new(client: Client, base_url: &str) -> Result<Self, AccountApiError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self {
            client,
            authenticate_url: base.join(AUTHENTICATE_PATH)?,
        })
    }

    #[must_use]
    pub const fn authenticate_url(&self) -> &Url {
        &self.authenticate_url
    }
}

/// 200 accepts the password, 401 and 403 reject it; anything else is an error.
fn password_accepted(status: StatusCode) -> Result<bool, AccountApiError> {
    match status {
        StatusCode::OK => Ok(true),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
        other => Err(AccountApiError::Status(other.as_u16())),
    }
}

#[async_trait]
impl PasswordCheck for HttpAccountApi {
    async fn authenticate(
        &self,
        access_token: &SecretString,
        email: Option<&str>,
        password: &SecretString,
    ) -> Result<bool, AccountApiError> {
        let span = info_span!(
            "account.authenticate",
            http.method = "POST",
            url = %self.authenticate_url
        );
        async {
            let response = self
                .client
                .post(self.authenticate_url.clone())
                .bearer_auth(access_token.expose_secret())
                .json(&AuthenticateRequest {
                    email,
                    password: password.expose_secret(),
                })
                .send()
                .await
                .map_err(|err| AccountApiError::Transport(err.to_string()))?;
            password_accepted(response.status())
        }
        .instrument(span)
        .await
    }
}
