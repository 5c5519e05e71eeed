use oauth2::ClientSecret;
use serde::{Deserialize, Serialize};

use super::jwt::VerifiedIdToken;

/// Per-login state sealed into the flow cookie.
///
/// Lives only in the browser between `/login` and `/authn-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowState {
    /// Effective client ID.
    pub client_id: String,
    /// Effective client secret.
    pub client_secret: ClientSecret,
    /// Anti-CSRF value sent as `state`.
    pub state: String,
    /// Value the ID token `nonce` must echo.
    pub nonce: String,
}

/// Body of a successful OP token endpoint response.
///
/// Missing token fields decode as empty and are rejected later by the
/// callback, which reports which one was absent.
#[derive(Deserialize)]
pub struct TokenResponse {
    /// Bearer token for userinfo.
    #[serde(default)]
    pub access_token: String,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: String,
    /// Not used by this RP.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Signed ID token.
    #[serde(default)]
    pub id_token: String,
}

/// JSON returned by `/authn-token` once the flow completes.
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// Verified ID token header and claims.
    pub idtoken: VerifiedIdToken,
    /// Userinfo document as the OP sent it.
    pub userinfo: serde_json::Value,
}
