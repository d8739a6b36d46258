//! Cookie helpers for the session id (`am`) and the logged-out marker (`lo`).

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

pub const SESSION_COOKIE_NAME: &str = "am";
pub const LOGGED_OUT_COOKIE_NAME: &str = "lo";

/// First value of cookie `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
}

/// True when the browser carries `lo=true`.
pub fn is_logged_out_marker_set(headers: &HeaderMap) -> bool {
    cookie_value(headers, LOGGED_OUT_COOKIE_NAME).as_deref() == Some("true")
}

/// Marker that lets later requests short-circuit to the signed-out page.
pub fn logged_out_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{LOGGED_OUT_COOKIE_NAME}=true; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
