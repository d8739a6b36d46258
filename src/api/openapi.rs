use super::{
    handlers::{health, journeys, logout},
    middleware,
};
use crate::journey::{Event, JOURNEY_ROUTES, Step, routes::SIGN_OUT_EVERYWHERE};
use axum::{
    middleware::from_fn,
    routing::{MethodRouter, get, post},
};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Endpoints added via `.routes(routes!(...))` are served and documented;
/// journey pages, their password forms and sign-out are served through
/// `.route` only.
pub(crate) fn api_router() -> OpenApiRouter {
    let public = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(logout::backchannel_logout))
        .routes(routes!(logout::global_logout))
        .route(logout::LOGOUT_REDIRECT, get(logout::logout_redirect));

    let mut router = public.merge(protected_router());

    let mut logout_tag = Tag::new("logout");
    logout_tag.description = Some("Back-channel logout from the identity provider".to_string());

    let mut journeys_tag = Tag::new("journeys");
    journeys_tag.description = Some("Account management journeys".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and dependency health".to_string());

    router.get_openapi_mut().tags = Some(vec![logout_tag, journeys_tag, health_tag]);

    router
}

/// Routes for signed-in users.
///
/// `route_layer` wraps in reverse: auth runs first, then the journey guard,
/// then the token refresh.
fn protected_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::new()
        .routes(routes!(journeys::your_services))
        .routes(routes!(journeys::start_journey))
        .route("/sign-out", post(logout::sign_out));

    for route in JOURNEY_ROUTES {
        let mut method_router: MethodRouter = get(journeys::journey_page);
        if route.step == Step::Event(Event::Authenticated) {
            method_router = method_router.post(journeys::enter_password);
        } else if route.path == SIGN_OUT_EVERYWHERE {
            method_router = method_router.post(logout::sign_out_everywhere);
        }
        router = router.route(route.path, method_router);
    }

    router
        .route_layer(from_fn(middleware::refresh_tokens))
        .route_layer(from_fn(middleware::journey_guard))
        .route_layer(from_fn(middleware::require_auth))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => {
            let email = rest.trim_end_matches('>').trim();
            (optional_str(name.trim()), optional_str(email))
        }
        None => (optional_str(author), None),
    }
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_public_and_journey_endpoints() {
        let openapi = openapi();
        for path in [
            "/health",
            "/backchannel-logout",
            "/global-logout",
            "/journeys/{journey}",
            "/your-services",
        ] {
            assert!(openapi.paths.paths.contains_key(path), "{path} missing");
        }
        assert!(!openapi.paths.paths.contains_key("/sign-out"));
        assert_eq!(openapi.info.title, env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn parse_author_splits_email() {
        assert_eq!(
            parse_author("Team <team@example.test>"),
            (Some("Team"), Some("team@example.test"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
    }
}
