//! OpenID Connect Authorization Code flow for a single OP.
//!
//! `/login` seals a fresh [`models::FlowState`] into a cookie and redirects
//! the browser to the OP. `/authn-token` opens that cookie when the OP sends
//! the browser back, then exchanges the code and fetches userinfo.

pub mod client;
/// Flow cookie construction.
pub mod cookies;
/// Client assertion signing and ID token verification.
pub mod jwt;
/// Flow state and response payloads.
pub mod models;
/// Duplicate-aware query parsing.
pub mod query;
/// `/login` and `/authn-token` handlers.
pub mod routes;
/// Callback validation pipeline.
pub mod service;

pub use routes::routes;

/// Starts a login.
pub const LOGIN_PATH: &str = "/login";
/// OP redirect target.
pub const CALLBACK_PATH: &str = "/authn-token";

/// Envelope label binding a sealed value to its use as login flow state.
pub const FLOW_STATE_LABEL: &str = "AuthnReqState";
