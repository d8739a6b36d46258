//! Journey entry points and the guarded journey pages.

use crate::{
    api::AppState,
    journey::{
        Event, JourneyType, StateName,
        routes::{self, YOUR_SERVICES},
    },
    session::SessionHandle,
};
use axum::{
    Form, Json,
    extract::{Extension, MatchedPath, Path},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

pub const INCORRECT_PASSWORD: &str = "INCORRECT_PASSWORD";
pub const PASSWORD_REQUIRED: &str = "PASSWORD_REQUIRED";

#[derive(Debug, Serialize, ToSchema)]
pub struct JourneySummary {
    journey: String,
    state: String,
    allowed_events: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct YourServices {
    subject_id: String,
    journeys: Vec<JourneySummary>,
}

#[utoipa::path(
    get,
    path = "/your-services",
    responses(
        (status = 200, description = "Journeys in flight for the signed-in user", body = YourServices),
        (status = 303, description = "No session, redirect to the session-expired page")
    ),
    tag = "journeys"
)]
pub async fn your_services(Extension(handle): Extension<SessionHandle>) -> Json<YourServices> {
    let slot = handle.lock().await;
    let journeys = slot
        .user()
        .journeys
        .iter()
        .map(|(journey, state)| JourneySummary {
            journey: journey.to_string(),
            state: state.value().to_string(),
            allowed_events: state
                .allowed_events()
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
        .collect();
    Json(YourServices {
        subject_id: slot.user().subject_id.clone(),
        journeys,
    })
}

#[utoipa::path(
    post,
    path = "/journeys/{journey}",
    params(
        ("journey" = String, Path, description = "Journey type, e.g. `changeEmail`")
    ),
    responses(
        (status = 303, description = "Journey started, or no session; redirect to the next page"),
        (status = 404, description = "Unknown journey")
    ),
    tag = "journeys"
)]
pub async fn start_journey(
    Path(journey): Path<String>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    let Ok(journey) = journey.parse::<JourneyType>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    handle.lock().await.user_mut().journeys.start(journey);

    match routes::entry_page(journey) {
        Some(route) => Redirect::to(route.path).into_response(),
        None => Redirect::to(YOUR_SERVICES).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct JourneyPage {
    journey: JourneyType,
    page: &'static str,
    state: StateName,
    allowed_events: Vec<Event>,
}

/// Render a guarded journey page as its current journey state.
pub async fn journey_page(
    matched: MatchedPath,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    let Some(route) = routes::lookup(matched.as_str()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let slot = handle.lock().await;
    let Some(state) = slot.user().journeys.get(route.journey) else {
        return Redirect::to(YOUR_SERVICES).into_response();
    };
    Json(JourneyPage {
        journey: route.journey,
        page: route.path,
        state: state.value(),
        allowed_events: state.allowed_events().iter().copied().collect(),
    })
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct EnterPasswordForm {
    #[serde(default)]
    password: String,
}

fn bad_request(code: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": code }))).into_response()
}

/// Password step shared by every journey: once the account management API
/// accepts the password the journey fires `AUTHENTICATED` and moves on.
pub async fn enter_password(
    matched: MatchedPath,
    Extension(state): Extension<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    Form(form): Form<EnterPasswordForm>,
) -> Response {
    let Some(route) = routes::lookup(matched.as_str()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if form.password.is_empty() {
        return bad_request(PASSWORD_REQUIRED);
    }

    let (access_token, email) = {
        let slot = handle.lock().await;
        (slot.user().tokens.access_token.clone(), slot.user().email.clone())
    };
    let password = SecretString::from(form.password);

    match state
        .password_check()
        .authenticate(&access_token, email.as_deref(), &password)
        .await
    {
        Ok(true) => {
            handle
                .lock()
                .await
                .user_mut()
                .journeys
                .advance(route.journey, Event::Authenticated);
            info!(journey = %route.journey, "password accepted");
            let next = routes::page_after_password(route.journey)
                .map_or(YOUR_SERVICES, |next| next.path);
            Redirect::to(next).into_response()
        }
        Ok(false) => bad_request(INCORRECT_PASSWORD),
        Err(err) => {
            error!("Failed to check password: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
