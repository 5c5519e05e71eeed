use axum::{
    Json, Router,
    extract::{RawQuery, State},
    http::Method,
    response::Redirect,
    routing::get,
};
use axum_extra::extract::CookieJar;
use oauth2::{ClientSecret, CsrfToken};
use openidconnect::Nonce;
use url::Url;

use super::{
    CALLBACK_PATH, FLOW_STATE_LABEL, LOGIN_PATH, cookies,
    models::{CallbackResponse, FlowState},
    query::QueryParams,
    service,
};
use crate::{ApiState, error::ApiError, metrics};

/// Login and callback routes.
///
/// Both accept GET only. `get` would also answer HEAD, so HEAD is rejected
/// explicitly to keep it from minting cookies or spending codes.
pub fn routes() -> Router<ApiState> {
    Router::new()
        .route(
            LOGIN_PATH,
            get(login).head(reject_method).fallback(reject_method),
        )
        .route(
            CALLBACK_PATH,
            get(authn_token).head(reject_method).fallback(reject_method),
        )
}

async fn reject_method(method: Method) -> ApiError {
    ApiError::Protocol(format!("Bad HTTP method: {method}"))
}

/// Start a login: seal fresh flow state into a cookie and redirect to the OP.
///
/// `clientid` and `secret` query parameters override the configured client,
/// but only when both are given.
async fn login(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let params = QueryParams::parse(query.as_deref());
    let (client_id, client_secret) = resolve_client(&state, &params).inspect_err(|e| {
        metrics::record_flow_event("login", e.kind());
    })?;

    let flow = FlowState {
        client_id,
        client_secret,
        state: CsrfToken::new_random().secret().clone(),
        nonce: Nonce::new_random().secret().clone(),
    };

    let payload = serde_json::to_vec(&flow)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize flow state: {e}")))?;
    let sealed = state.sealer.seal(FLOW_STATE_LABEL, &payload)?;

    let cookie = cookies::create_flow_cookie(
        sealed,
        &state.environment,
        state.flow_cookie_max_age_secs,
        &state.cookie_domain,
    );
    let auth_url = authorization_url(&state, &flow);

    metrics::record_flow_event("login", "success");
    tracing::info!(client_id = %flow.client_id, "Redirecting to OP authn endpoint");

    Ok((jar.add(cookie), Redirect::to(auth_url.as_str())))
}

fn resolve_client(
    state: &ApiState,
    params: &QueryParams,
) -> Result<(String, ClientSecret), ApiError> {
    match (params.optional("clientid")?, params.optional("secret")?) {
        (None, None) => Ok((
            state.default_client.client_id.as_str().to_owned(),
            state.default_client.client_secret.clone(),
        )),
        (Some(client_id), Some(secret)) => {
            if client_id.is_empty() || secret.is_empty() {
                return Err(ApiError::Protocol(
                    "clientid and secret query parameters must not be empty".to_string(),
                ));
            }
            Ok((client_id.to_owned(), ClientSecret::new(secret.to_owned())))
        }
        _ => Err(ApiError::Protocol(
            "Both clientid and secret query parameters must be provided".to_string(),
        )),
    }
}

fn authorization_url(state: &ApiState, flow: &FlowState) -> Url {
    let scope = std::iter::once("openid")
        .chain(state.scopes.iter().map(|scope| scope.as_str()))
        .collect::<Vec<_>>()
        .join(" ");

    let mut url = state.provider.authorize.url().clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("scope", &scope)
        .append_pair("client_id", &flow.client_id)
        .append_pair("state", &flow.state)
        .append_pair("nonce", &flow.nonce)
        .append_pair("redirect_uri", state.redirect_url.url().as_str());
    url
}

/// OP redirect target. The flow cookie is cleared whatever the outcome, so a
/// sealed state is only ever presented once by this browser.
async fn authn_token(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
    jar: CookieJar,
) -> (CookieJar, Result<Json<CallbackResponse>, ApiError>) {
    let params = QueryParams::parse(query.as_deref());
    let sealed = jar
        .get(cookies::FLOW_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned());

    let result = service::complete_flow(&state, sealed.as_deref(), &params).await;
    match &result {
        Ok(_) => metrics::record_flow_event("callback", "success"),
        Err(e) => metrics::record_flow_event("callback", e.kind()),
    }

    let jar = if sealed.is_some() {
        jar.remove(cookies::flow_cookie_removal(&state.cookie_domain))
    } else {
        jar
    };

    (jar, result.map(Json))
}
