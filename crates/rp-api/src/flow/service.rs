use std::fmt;

use super::{
    FLOW_STATE_LABEL,
    client::{self, CodeExchange},
    jwt::{self, ClientAssertionClaims, IdTokenExpectations},
    models::{CallbackResponse, FlowState, TokenResponse},
    query::QueryParams,
};
use crate::{ApiState, error::ApiError};

/// Progress of a callback through its validation pipeline.
///
/// Each variant names the last step that succeeded. A failure at any point
/// rejects the request from the stage it had reached; there are no retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Request accepted by the router.
    Received,
    /// Flow cookie authenticated and labelled as login state.
    CookieOpened,
    /// Payload decoded into a flow state.
    StateDecoded,
    /// Returned `state` matches.
    StateChecked,
    /// Exactly one `code` present.
    CodeChecked,
    /// Client assertion signed.
    AssertionSigned,
    /// Token endpoint answered 200 JSON.
    TokenExchanged,
    /// ID token verified.
    TokenParsed,
    /// ID token `nonce` matches.
    NonceChecked,
    /// Userinfo fetched.
    UserInfoFetched,
    /// Response composed.
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Pipeline {
    stage: Stage,
}

impl Pipeline {
    const fn new() -> Self {
        Self {
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!(from = %self.stage, to = %next, "Callback advanced");
        self.stage = next;
    }

    fn reject(&self, err: ApiError) -> ApiError {
        tracing::warn!(stage = %self.stage, kind = err.kind(), error = %err, "Callback rejected");
        err
    }
}

/// Validate an OP redirect against the sealed flow state and complete the
/// code exchange.
///
/// `state` is compared before any network call, so a forged redirect never
/// reaches the OP. The ID token `nonce` is checked separately once the token
/// endpoint has answered.
pub async fn complete_flow(
    state: &ApiState,
    sealed: Option<&str>,
    params: &QueryParams,
) -> Result<CallbackResponse, ApiError> {
    let mut pipeline = Pipeline::new();

    let sealed = sealed.ok_or_else(|| {
        pipeline.reject(ApiError::Protocol("Missing authn flow cookie".to_string()))
    })?;
    let opened = state
        .sealer
        .open(sealed)
        .map_err(|e| pipeline.reject(e.into()))?;
    if opened.label != FLOW_STATE_LABEL {
        return Err(pipeline.reject(ApiError::Format(
            "Flow cookie was not sealed as login state".to_string(),
        )));
    }
    pipeline.advance(Stage::CookieOpened);

    // The payload holds the client secret, so serde's message is not echoed
    let flow: FlowState = serde_json::from_slice(&opened.payload).map_err(|_| {
        pipeline.reject(ApiError::Format(
            "Flow cookie payload is not a valid flow state".to_string(),
        ))
    })?;
    pipeline.advance(Stage::StateDecoded);

    let returned_state = params.single("state").map_err(|e| pipeline.reject(e))?;
    if returned_state != flow.state {
        return Err(pipeline.reject(ApiError::Protocol(
            "State match failed: the authn response does not belong to this browser's login"
                .to_string(),
        )));
    }
    pipeline.advance(Stage::StateChecked);

    if params.contains("error") {
        return Err(pipeline.reject(ApiError::Protocol(format!(
            "OP authn request error: {}\n{}\n{}",
            params.joined("error"),
            params.joined("error_description"),
            params.joined("error_uri"),
        ))));
    }
    let code = params.single("code").map_err(|e| pipeline.reject(e))?;
    pipeline.advance(Stage::CodeChecked);

    let secret = flow.client_secret.secret().as_bytes();
    let claims = ClientAssertionClaims::new(&flow.client_id, state.provider.token.url().as_str());
    let client_assertion = jwt::sign(&claims, secret).map_err(|e| pipeline.reject(e.into()))?;
    pipeline.advance(Stage::AssertionSigned);

    let exchange = CodeExchange {
        code,
        client_id: &flow.client_id,
        client_assertion: &client_assertion,
        redirect_uri: state.redirect_url.url().as_str(),
    };
    let body = client::exchange_code(&state.http_client, &state.provider.token, &exchange)
        .await
        .map_err(|e| pipeline.reject(e))?;
    pipeline.advance(Stage::TokenExchanged);

    let tokens: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        pipeline.reject(ApiError::Format(format!(
            "Error decoding token response body: {e}"
        )))
    })?;
    if tokens.id_token.is_empty() {
        return Err(pipeline.reject(ApiError::Format(
            "Missing token response ID token".to_string(),
        )));
    }
    let expectations = IdTokenExpectations {
        audience: &flow.client_id,
        issuer: state.provider.issuer.as_deref(),
    };
    let id_token = jwt::verify_id_token(&tokens.id_token, secret, &expectations)
        .map_err(|e| pipeline.reject(e.into()))?;
    tracing::debug!(
        token_type = %tokens.token_type,
        expires_in = ?tokens.expires_in,
        has_refresh_token = tokens.refresh_token.is_some(),
        "Token response parsed"
    );
    pipeline.advance(Stage::TokenParsed);

    if id_token.claims.nonce != flow.nonce {
        return Err(pipeline.reject(ApiError::Protocol(
            "Authn request nonce does not match ID token nonce".to_string(),
        )));
    }
    pipeline.advance(Stage::NonceChecked);

    if tokens.access_token.is_empty() {
        return Err(pipeline.reject(ApiError::Format(
            "Missing token response access token".to_string(),
        )));
    }
    let userinfo = client::fetch_userinfo(
        &state.http_client,
        &state.provider.userinfo,
        &tokens.access_token,
    )
    .await
    .map_err(|e| pipeline.reject(e))?;
    pipeline.advance(Stage::UserInfoFetched);

    let response = CallbackResponse {
        idtoken: id_token,
        userinfo,
    };
    pipeline.advance(Stage::Responded);

    tracing::info!(
        client_id = %flow.client_id,
        sub = %response.idtoken.claims.sub,
        "Authn flow completed"
    );

    Ok(response)
}
