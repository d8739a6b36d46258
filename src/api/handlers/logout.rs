//! Voluntary, global and back-channel logout.

use crate::{
    api::{AccountConfig, AppState, cookies::logged_out_cookie},
    journey::{Event, JourneyType, routes::SIGNED_OUT},
    session::SessionHandle,
};
use axum::{
    Form, Json,
    extract::{Extension, FromRequest, Query, Request},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Redirect, Response},
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;
use utoipa::ToSchema;

pub const LOGOUT_REDIRECT: &str = "/logout-redirect";
pub const UNAVAILABLE_TEMPORARY: &str = "/unavailable-temporary";
pub const UNAVAILABLE_PERMANENT: &str = "/unavailable-permanent";
pub const ACCOUNT_DELETED_CONFIRMATION: &str = "/account-deleted-confirmation";

/// Why the user is being signed out; round-trips through the provider as `state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogoutState {
    #[default]
    Default,
    Suspended,
    Blocked,
    AccountDeletion,
}

impl LogoutState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Suspended => "suspended",
            Self::Blocked => "blocked",
            Self::AccountDeletion => "accountDeletion",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Default,
            Self::Suspended,
            Self::Blocked,
            Self::AccountDeletion,
        ]
        .into_iter()
        .find(|state| state.as_str() == value)
    }

    /// Page shown once the provider sends the browser back.
    #[must_use]
    pub const fn landing_page(self) -> &'static str {
        match self {
            Self::Default => SIGNED_OUT,
            Self::Suspended => UNAVAILABLE_TEMPORARY,
            Self::Blocked => UNAVAILABLE_PERMANENT,
            Self::AccountDeletion => ACCOUNT_DELETED_CONFIRMATION,
        }
    }
}

/// Provider end-session URL carrying the id token hint and our return address.
#[must_use]
pub fn end_session_url(config: &AccountConfig, id_token: &str, state: LogoutState) -> Url {
    let mut url = config.end_session_endpoint().clone();
    url.query_pairs_mut()
        .append_pair("id_token_hint", id_token)
        .append_pair("post_logout_redirect_uri", &config.post_logout_redirect_uri())
        .append_pair("state", state.as_str());
    url
}

/// Logged-out marker for the browser; a deleted account gets none, so the
/// next sign-in starts clean.
fn logout_cookie(
    logout_state: LogoutState,
    secure: bool,
) -> Option<Result<HeaderValue, InvalidHeaderValue>> {
    (logout_state != LogoutState::AccountDeletion).then(|| logged_out_cookie(secure))
}

/// Tear down every session of the signed-in subject and hand the browser to
/// the provider's end-session endpoint.
pub async fn logout(state: &AppState, handle: &SessionHandle, logout_state: LogoutState) -> Response {
    let (subject_id, id_token) = {
        let slot = handle.lock().await;
        (
            slot.user().subject_id.clone(),
            slot.user().tokens.id_token.expose_secret().to_string(),
        )
    };

    let report = state
        .teardown()
        .destroy_all_sessions_for_subject(Some(handle), &subject_id)
        .await;
    debug!(
        attempted = report.attempted,
        failed = report.failed,
        "signed out subject sessions"
    );

    // the session middleware clears `am` for the destroyed local session
    let mut headers = HeaderMap::new();
    if let Some(cookie) = logout_cookie(logout_state, state.config().cookie_secure()) {
        match cookie {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build logout cookie: {err}"),
        }
    }

    let url = end_session_url(state.config(), &id_token, logout_state);
    (headers, Redirect::to(url.as_str())).into_response()
}

// axum handler for the "sign out" link
pub async fn sign_out(
    Extension(state): Extension<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    logout(&state, &handle, LogoutState::Default).await
}

/// Final step of the sign-out-everywhere journey.
pub async fn sign_out_everywhere(
    Extension(state): Extension<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    handle
        .lock()
        .await
        .user_mut()
        .journeys
        .advance(JourneyType::GlobalLogout, Event::ValueUpdated);
    logout(&state, &handle, LogoutState::Default).await
}

#[derive(Debug, Deserialize)]
pub struct LogoutRedirectQuery {
    state: Option<String>,
}

pub async fn logout_redirect(Query(query): Query<LogoutRedirectQuery>) -> Redirect {
    let state = query
        .state
        .as_deref()
        .and_then(LogoutState::parse)
        .unwrap_or_default();
    Redirect::to(state.landing_page())
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutTokenRequest {
    /// Signed logout token issued by the identity provider.
    #[serde(default)]
    logout_token: Option<String>,
}

#[utoipa::path(
    post,
    path = "/backchannel-logout",
    request_body(
        content = LogoutTokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Form or JSON body carrying `logout_token`"
    ),
    responses(
        (status = 200, description = "Logout token accepted, subject sessions torn down"),
        (status = 401, description = "Logout token rejected")
    ),
    tag = "logout"
)]
pub async fn backchannel_logout(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> StatusCode {
    receive_logout_token(&state, request).await
}

#[utoipa::path(
    post,
    path = "/global-logout",
    request_body(
        content = LogoutTokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Form or JSON body carrying `logout_token`"
    ),
    responses(
        (status = 200, description = "Logout token accepted, subject sessions torn down"),
        (status = 401, description = "Logout token rejected")
    ),
    tag = "logout"
)]
pub async fn global_logout(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> StatusCode {
    receive_logout_token(&state, request).await
}

async fn receive_logout_token(state: &AppState, request: Request) -> StatusCode {
    let token = read_logout_token(request).await;
    match state.logout_verifier().verify(token.as_deref()).await {
        Ok(verified) => {
            info!(jti = ?verified.jti, "logout token accepted");
            state
                .teardown()
                .destroy_all_sessions_for_subject(None, &verified.subject_id)
                .await;
            StatusCode::OK
        }
        Err(err) => {
            error!("Unable to validate logout_token: {err}");
            StatusCode::UNAUTHORIZED
        }
    }
}

async fn read_logout_token(request: Request) -> Option<String> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let body = if is_json {
        match Json::<LogoutTokenRequest>::from_request(request, &()).await {
            Ok(Json(body)) => body,
            Err(err) => {
                debug!("logout request body rejected: {err}");
                LogoutTokenRequest::default()
            }
        }
    } else {
        match Form::<LogoutTokenRequest>::from_request(request, &()).await {
            Ok(Form(body)) => body,
            Err(err) => {
                debug!("logout request body rejected: {err}");
                LogoutTokenRequest::default()
            }
        }
    };
    body.logout_token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccountConfig {
        match AccountConfig::new(
            "https://account.example.test/",
            "https://oidc.example.test/logout",
        ) {
            Ok(config) => config,
            Err(err) => panic!("config: {err}"),
        }
    }

    #[test]
    fn logout_state_parses_known_values_only() {
        assert_eq!(
            LogoutState::parse("accountDeletion"),
            Some(LogoutState::AccountDeletion)
        );
        assert_eq!(LogoutState::parse("suspended"), Some(LogoutState::Suspended));
        assert_eq!(LogoutState::parse("Suspended"), None);
        assert_eq!(LogoutState::default().landing_page(), SIGNED_OUT);
    }

    #[test]
    fn account_deletion_sets_no_logout_cookie() {
        assert!(logout_cookie(LogoutState::AccountDeletion, true).is_none());

        for state in [
            LogoutState::Default,
            LogoutState::Suspended,
            LogoutState::Blocked,
        ] {
            let cookie = logout_cookie(state, false).and_then(Result::ok);
            assert!(
                cookie.is_some_and(|value| value.to_str().is_ok_and(|v| v.starts_with("lo=true"))),
                "{state:?}"
            );
        }
    }

    #[test]
    fn end_session_url_carries_hint_and_return_address() {
        let url = end_session_url(&config(), "id-token", LogoutState::Blocked);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        assert_eq!(url.path(), "/logout");
        assert_eq!(
            pairs,
            vec![
                ("id_token_hint".to_string(), "id-token".to_string()),
                (
                    "post_logout_redirect_uri".to_string(),
                    "https://account.example.test/logout-redirect".to_string()
                ),
                ("state".to_string(), "blocked".to_string()),
            ]
        );
    }
}
