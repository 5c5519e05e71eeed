pub mod request_id;
/// Response headers hardening every route.
pub mod security_headers;
