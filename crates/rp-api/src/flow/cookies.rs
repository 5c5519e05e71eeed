use axum_extra::extract::cookie::{Cookie, SameSite};

use super::CALLBACK_PATH;
use crate::config::Environment;

/// Name of the cookie carrying the sealed flow state.
pub const FLOW_COOKIE_NAME: &str = "authn_flow";

/// Create the cookie carrying a sealed flow state
///
/// The cookie is only sent back on the callback path and is unreadable to
/// scripts. It is secure (HTTPS-only) unless running in development.
///
/// SameSite=Lax is required here: the OP's redirect back to the callback is
/// a cross-site top-level navigation, which Strict would strip the cookie from.
pub fn create_flow_cookie(
    sealed_state: String,
    environment: &Environment,
    max_age_secs: i64,
    cookie_domain: &str,
) -> Cookie<'static> {
    Cookie::build((FLOW_COOKIE_NAME, sealed_state))
        .path(CALLBACK_PATH)
        .max_age(time::Duration::seconds(max_age_secs))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!environment.is_development())
        .domain(cookie_domain.to_string())
        .build()
}

/// Cookie identifying the flow cookie for removal, matching its path and domain
pub fn flow_cookie_removal(cookie_domain: &str) -> Cookie<'static> {
    Cookie::build(FLOW_COOKIE_NAME)
        .path(CALLBACK_PATH)
        .domain(cookie_domain.to_string())
        .build()
}
