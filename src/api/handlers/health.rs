use crate::{GIT_COMMIT_HASH, api::AppState};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    session_store: String,
    issuer_keys: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Session store and issuer key set are healthy", body = [Health]),
        (status = 503, description = "Session store or issuer key set is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store();
    let store_result = store.ping().await;
    if let Err(err) = &store_result {
        error!("Failed to ping {} session store: {err}", store.kind());
    }

    let keys_status = state.logout_verifier().keys().dependency_status().await;
    let is_healthy = store_result.is_ok() && keys_status.is_healthy();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        session_store: if store_result.is_ok() {
            store.kind().to_string()
        } else {
            "error".to_string()
        },
        issuer_keys: keys_status.as_str().to_string(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(x_app_header_value) => {
            debug!("X-App header: {:?}", x_app_header_value);
            headers.insert("X-App", x_app_header_value);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    let status = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, headers, Json(health))
}
