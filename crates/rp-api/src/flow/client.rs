//! Outbound calls to the OP token and userinfo endpoints.

use axum::http::{StatusCode, header::CONTENT_TYPE};
use oauth2::TokenUrl;
use openidconnect::UserInfoUrl;

use super::jwt::CLIENT_ASSERTION_TYPE;
use crate::error::ApiError;

/// Form fields of an authorization code exchange.
#[derive(Debug)]
pub struct CodeExchange<'a> {
    /// Authorization code from the callback.
    pub code: &'a str,
    /// Effective client ID.
    pub client_id: &'a str,
    /// Signed `client_secret_jwt` assertion.
    pub client_assertion: &'a str,
    /// Same redirect URI sent on the authorization request.
    pub redirect_uri: &'a str,
}

/// POST the code to the token endpoint and return the raw JSON body.
///
/// Anything other than `200` with a JSON content type is an error carrying
/// the status and body the OP sent.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &TokenUrl,
    exchange: &CodeExchange<'_>,
) -> Result<String, ApiError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", exchange.code),
        ("client_id", exchange.client_id),
        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
        ("client_assertion", exchange.client_assertion),
        ("redirect_uri", exchange.redirect_uri),
    ];

    tracing::debug!(endpoint = %token_url.url(), client_id = %exchange.client_id, "Exchanging authorization code");

    let response = http
        .post(token_url.url().as_str())
        .form(&form)
        .send()
        .await
        .map_err(|e| ApiError::Transport(format!("Token endpoint request failed: {e}")))?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(format!("Reading token response failed: {e}")))?;

    if status != StatusCode::OK {
        return Err(ApiError::UpstreamStatus {
            endpoint: "token",
            status,
            detail: body,
        });
    }

    if !is_json(content_type.as_deref()) {
        return Err(ApiError::UpstreamStatus {
            endpoint: "token",
            status,
            detail: format!(
                "Unexpected Content-Type: {}\n{body}",
                content_type.as_deref().unwrap_or("<none>")
            ),
        });
    }

    Ok(body)
}

/// GET the userinfo document with the access token as bearer credential.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    userinfo_url: &UserInfoUrl,
    access_token: &str,
) -> Result<serde_json::Value, ApiError> {
    tracing::debug!(endpoint = %userinfo_url.url(), "Fetching userinfo");

    let response = http
        .get(userinfo_url.url().as_str())
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| ApiError::Transport(format!("Userinfo request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(format!("Reading userinfo response failed: {e}")))?;

    if status != StatusCode::OK {
        return Err(ApiError::UpstreamStatus {
            endpoint: "userinfo",
            status,
            detail: body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ApiError::Format(format!("Userinfo response is not JSON: {e}")))
}

/// Media type check that ignores parameters such as `charset`.
fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case("application/json"))
}
