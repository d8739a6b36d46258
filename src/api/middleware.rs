//! Request middleware: session load/persist, sign-in check, journey guard and
//! access-token refresh.
//!
//! Protected routes run them in this order: session, auth, guard, refresh.

use super::{
    AppState,
    cookies::{SESSION_COOKIE_NAME, clear_session_cookie, cookie_value, is_logged_out_marker_set},
};
use crate::{
    journey::{
        self,
        routes::{SESSION_EXPIRED, SIGNED_OUT, YOUR_SERVICES},
    },
    oidc::RefreshError,
    session::{SessionHandle, WriteBack},
};
use axum::{
    Extension,
    extract::{MatchedPath, Request},
    http::{StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

/// Load the session named by the `am` cookie and write changes back afterwards.
///
/// Write-back only updates a record that is still stored, so a logout that
/// removed the session mid-request is not undone. A destroyed or vanished
/// session gets its cookie cleared.
pub async fn load_session(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let handle = match cookie_value(request.headers(), SESSION_COOKIE_NAME) {
        Some(id) if !id.is_empty() => match state.store().get(&id).await {
            Ok(record) => record.map(SessionHandle::from_record),
            Err(err) => {
                error!("Failed to load session: {err}");
                None
            }
        },
        _ => None,
    };

    if let Some(handle) = &handle {
        request.extensions_mut().insert(handle.clone());
    }

    let mut response = next.run(request).await;

    let Some(handle) = handle else {
        return response;
    };
    let still_stored = match handle.write_back().await {
        WriteBack::Unchanged => true,
        WriteBack::Modified(record) => match state.store().update(record).await {
            Ok(updated) => {
                if !updated {
                    debug!("Session removed during the request, not written back");
                }
                updated
            }
            Err(err) => {
                error!("Failed to persist session: {err}");
                true
            }
        },
        WriteBack::Destroyed => false,
    };
    if !still_stored {
        match clear_session_cookie(state.config().cookie_secure()) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {err}"),
        }
    }
    response
}

/// Only signed-in browsers without the logged-out marker get through.
pub async fn require_auth(request: Request, next: Next) -> Response {
    if is_logged_out_marker_set(request.headers()) {
        return Redirect::to(SIGNED_OUT).into_response();
    }
    let Some(handle) = request.extensions().get::<SessionHandle>().cloned() else {
        return Redirect::to(SESSION_EXPIRED).into_response();
    };
    if !handle.lock().await.user().is_authenticated {
        return Redirect::to(SESSION_EXPIRED).into_response();
    }
    next.run(request).await
}

/// Redirect journey pages the session's state machine cannot reach.
pub async fn journey_guard(request: Request, next: Next) -> Response {
    let Some(route) = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|path| journey::routes::lookup(path.as_str()))
    else {
        return next.run(request).await;
    };
    let Some(handle) = request.extensions().get::<SessionHandle>().cloned() else {
        return Redirect::to(SESSION_EXPIRED).into_response();
    };

    let outcome = {
        let mut slot = handle.lock().await;
        journey::check(&mut slot.user_mut().journeys, route)
    };
    if outcome.is_proceed() {
        next.run(request).await
    } else {
        Redirect::to(YOUR_SERVICES).into_response()
    }
}

/// Refresh the session's access token before the handler runs.
pub async fn refresh_tokens(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(handle) = request.extensions().get::<SessionHandle>().cloned() {
        let mut slot = handle.lock().await;
        if let Err(err) = state
            .refresher()
            .ensure_fresh(&mut slot.user_mut().tokens)
            .await
        {
            return err.into_response();
        }
    }
    next.run(request).await
}

impl IntoResponse for RefreshError {
    fn into_response(self) -> Response {
        error!("{self}");
        (StatusCode::INTERNAL_SERVER_ERROR, self.code()).into_response()
    }
}
