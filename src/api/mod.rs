use crate::{
    account::PasswordCheck,
    oidc::{AccessTokenRefresher, LogoutTokenVerifier},
    session::{SessionRecordStore, SessionTeardown},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod cookies;
pub(crate) mod handlers;
pub mod middleware;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Public addresses the service needs to build redirects and cookies.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    base_url: Url,
    end_session_endpoint: Url,
}

impl AccountConfig {
    /// # Errors
    /// Returns an error if either URL does not parse or has no host.
    pub fn new(base_url: &str, end_session_endpoint: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        if base_url.host_str().is_none() {
            return Err(anyhow!("Base URL must include a valid host: {base_url}"));
        }
        let end_session_endpoint = Url::parse(end_session_endpoint)
            .with_context(|| format!("Invalid end session endpoint: {end_session_endpoint}"))?;
        Ok(Self {
            base_url,
            end_session_endpoint,
        })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub const fn end_session_endpoint(&self) -> &Url {
        &self.end_session_endpoint
    }

    /// Cookies are only marked `Secure` when the service is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            handlers::logout::LOGOUT_REDIRECT
        )
    }
}

/// Process-wide collaborators shared by every request.
pub struct AppState {
    config: AccountConfig,
    store: Arc<dyn SessionRecordStore>,
    teardown: SessionTeardown,
    logout_verifier: LogoutTokenVerifier,
    refresher: AccessTokenRefresher,
    password_check: Arc<dyn PasswordCheck>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AccountConfig,
        store: Arc<dyn SessionRecordStore>,
        logout_verifier: LogoutTokenVerifier,
        refresher: AccessTokenRefresher,
        password_check: Arc<dyn PasswordCheck>,
    ) -> Self {
        Self {
            config,
            teardown: SessionTeardown::new(Arc::clone(&store)),
            store,
            logout_verifier,
            refresher,
            password_check,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AccountConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn SessionRecordStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn teardown(&self) -> &SessionTeardown {
        &self.teardown
    }

    #[must_use]
    pub const fn logout_verifier(&self) -> &LogoutTokenVerifier {
        &self.logout_verifier
    }

    #[must_use]
    pub const fn refresher(&self) -> &AccessTokenRefresher {
        &self.refresher
    }

    #[must_use]
    pub fn password_check(&self) -> &dyn PasswordCheck {
        self.password_check.as_ref()
    }
}

/// Full application router with session handling, request ids and tracing.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    let (router, _openapi) = openapi::api_router().split_for_parts();
    router.layer(from_fn(middleware::load_session)).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
