//! Shared wiring for the router integration tests: an in-memory session store,
//! a static issuer key set built from the fixture keys, a scripted token
//! endpoint and a fixed account password.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, Response,
        header::{CONTENT_TYPE, COOKIE},
    },
};
use manage_account::{
    account::{AccountApiError, PasswordCheck},
    api::{self, AccountConfig, AppState},
    oidc::{
        AccessTokenRefresher, BACKCHANNEL_LOGOUT_EVENT, ClientAssertionSigner, ExchangeError,
        IssuerKeys, Jwks, LogoutTokenVerifier, TokenEndpoint, TokenResponse,
        jwt::{decode_private_key, sign_rs256},
    },
    session::{MemorySessionStore, SessionRecord, SessionRecordStore, TokenSet, UserSession},
};
use rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

pub const ISSUER: &str = "https://oidc.example.test";
pub const CLIENT_ID: &str = "manage-account";
pub const ISSUER_KID: &str = "issuer-1";
pub const BASE_URL: &str = "https://account.example.test";
pub const END_SESSION_ENDPOINT: &str = "https://oidc.example.test/logout";
pub const PASSWORD: &str = "correct-horse-battery-staple";
/// Password that makes the account API fail instead of answering.
pub const OUTAGE_PASSWORD: &str = "account-api-outage";

const ISSUER_KEY_PEM: &[u8] = include_bytes!("../fixtures/issuer_key.pem");
const ROGUE_KEY_PEM: &[u8] = include_bytes!("../fixtures/rogue_key.pem");
const CLIENT_KEY_PEM: &[u8] = include_bytes!("../fixtures/client_key.pem");

pub fn issuer_key() -> Result<RsaPrivateKey> {
    Ok(decode_private_key(ISSUER_KEY_PEM)?)
}

pub fn rogue_key() -> Result<RsaPrivateKey> {
    Ok(decode_private_key(ROGUE_KEY_PEM)?)
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Token endpoint that replays a fixed answer and counts calls.
pub struct ScriptedEndpoint {
    answer: Mutex<Option<Result<TokenResponse, ExchangeError>>>,
    calls: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn unused() -> Self {
        Self {
            answer: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(answer: Result<TokenResponse, ExchangeError>) -> Self {
        Self {
            answer: Mutex::new(Some(answer)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for ScriptedEndpoint {
    async fn refresh(
        &self,
        _refresh_token: &SecretString,
        _client_assertion: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .answer
            .lock()
            .map_err(|_| ExchangeError::Transport("poisoned".to_string()))?;
        match answer.as_ref() {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(ExchangeError::Status { status, body })) => Err(ExchangeError::Status {
                status: *status,
                body: body.clone(),
            }),
            Some(Err(err)) => Err(ExchangeError::Transport(err.to_string())),
            None => Err(ExchangeError::Transport("unexpected refresh".to_string())),
        }
    }

    fn audience(&self) -> &str {
        "https://oidc.example.test/token"
    }
}

/// Account API that knows a single password.
pub struct FixedPassword;

#[async_trait]
impl PasswordCheck for FixedPassword {
    async fn authenticate(
        &self,
        _access_token: &SecretString,
        _email: Option<&str>,
        password: &SecretString,
    ) -> Result<bool, AccountApiError> {
        match password.expose_secret() {
            OUTAGE_PASSWORD => Err(AccountApiError::Status(503)),
            candidate => Ok(candidate == PASSWORD),
        }
    }
}

/// Full router over `store`, refreshing tokens through `endpoint`.
pub fn router(store: Arc<MemorySessionStore>, endpoint: Arc<dyn TokenEndpoint>) -> Result<Router> {
    let keys = IssuerKeys::new_static(Jwks::from_rsa_private_key(&issuer_key()?, ISSUER_KID));
    let verifier =
        LogoutTokenVerifier::new(Arc::new(keys), ISSUER.to_string(), CLIENT_ID.to_string());

    let signer = ClientAssertionSigner::new(
        CLIENT_ID.to_string(),
        "client-1".to_string(),
        decode_private_key(CLIENT_KEY_PEM)?,
    );
    let refresher = AccessTokenRefresher::new(endpoint, signer);

    let config = AccountConfig::new(BASE_URL, END_SESSION_ENDPOINT)?;
    let state = AppState::new(config, store, verifier, refresher, Arc::new(FixedPassword));
    Ok(api::app(Arc::new(state)))
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemorySessionStore>,
    pub endpoint: Arc<ScriptedEndpoint>,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(ScriptedEndpoint::unused())
    }

    pub fn with_endpoint(endpoint: ScriptedEndpoint) -> Result<Self> {
        let store = Arc::new(MemorySessionStore::new());
        let endpoint = Arc::new(endpoint);
        Ok(Self {
            router: router(store.clone(), endpoint.clone())?,
            store,
            endpoint,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    /// Store a signed-in session with a fresh access token.
    pub async fn sign_in(&self, session_id: &str, subject_id: &str) -> Result<()> {
        let session = UserSession::authenticated(subject_id, tokens(now() + 3600)?);
        self.put(session_id, session).await
    }

    pub async fn put(&self, session_id: &str, session: UserSession) -> Result<()> {
        self.store
            .put(SessionRecord::new(session_id, session))
            .await?;
        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<UserSession>> {
        Ok(self
            .store
            .get(session_id)
            .await?
            .map(|record| record.session))
    }
}

/// Token set whose access token expires at `exp`.
pub fn tokens(exp: i64) -> Result<TokenSet> {
    let access_token = sign_rs256(
        &issuer_key()?,
        ISSUER_KID,
        &json!({ "sub": "123456", "exp": exp }),
    )?;
    Ok(TokenSet::new(&access_token, "refresh-token", "id-token"))
}

pub fn get(path: &str, session_id: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(id) = session_id {
        builder = builder.header(COOKIE, format!("am={id}"));
    }
    Ok(builder.body(Body::empty())?)
}

pub fn post(path: &str, session_id: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method("POST").uri(path);
    if let Some(id) = session_id {
        builder = builder.header(COOKIE, format!("am={id}"));
    }
    Ok(builder.body(Body::empty())?)
}

pub fn form(path: &str, session_id: Option<&str>, body: &str) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(id) = session_id {
        builder = builder.header(COOKIE, format!("am={id}"));
    }
    Ok(builder.body(Body::from(body.to_string()))?)
}

pub fn logout_claims(subject: &str) -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + 120,
        "jti": "e3c1b2a4-logout",
        "sub": subject,
        "events": { BACKCHANNEL_LOGOUT_EVENT: {} },
    })
}

pub fn sign_logout_token(key: &RsaPrivateKey, claims: &Value) -> Result<String> {
    Ok(sign_rs256(key, ISSUER_KID, claims)?)
}

pub fn location<B>(response: &Response<B>) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
}

pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub async fn body_string(response: Response<Body>) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
