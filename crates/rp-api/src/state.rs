//! Shared handler context.

use std::{sync::Arc, time::Duration};

use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};
use openidconnect::UserInfoUrl;
use rp_envelope::Sealer;

use crate::{ApiConfig, config::Environment};

/// The single OpenID Provider this RP talks to.
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    /// Authorization endpoint the browser is sent to.
    pub authorize: AuthUrl,
    /// Token endpoint; also the client assertion audience.
    pub token: TokenUrl,
    /// Userinfo endpoint.
    pub userinfo: UserInfoUrl,
    /// Expected `iss` of ID tokens; unchecked when `None`.
    pub issuer: Option<String>,
}

/// Client used when `/login` carries no override.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    /// Registered client ID.
    pub client_id: ClientId,
    /// Shared secret; redacted in `Debug`.
    pub client_secret: ClientSecret,
}

/// Request-independent context shared by every handler.
///
/// Built once at startup and never mutated afterwards. All per-flow state
/// travels in the sealed flow cookie instead.
#[derive(Clone, Debug)]
pub struct ApiState {
    /// OP endpoints.
    pub provider: Arc<ProviderEndpoints>,
    /// Default client.
    pub default_client: Arc<ClientCredentials>,
    /// Scopes requested after `openid`.
    pub scopes: Arc<[Scope]>,
    /// Callback URL registered with the OP.
    pub redirect_url: RedirectUrl,
    /// Seals and opens flow cookies.
    pub sealer: Arc<Sealer>,
    /// Outbound client for the token and userinfo calls.
    pub http_client: reqwest::Client,
    /// `Domain` of the flow cookie.
    pub cookie_domain: String,
    /// `Max-Age` of the flow cookie.
    pub flow_cookie_max_age_secs: i64,
    /// Deployment environment.
    pub environment: Environment,
}

impl ApiState {
    /// Build the state with an outbound client honouring the configured timeout.
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        // OP redirects are never followed so bearer tokens stay on the configured host
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Self::with_http_client(config, http_client)
    }

    /// Build the state around an outbound client the caller already trusts.
    pub fn with_http_client(
        config: &ApiConfig,
        http_client: reqwest::Client,
    ) -> anyhow::Result<Self> {
        let endpoints = config.endpoints()?;
        let provider = ProviderEndpoints {
            authorize: AuthUrl::new(endpoints.authorize)?,
            token: TokenUrl::new(endpoints.token)?,
            userinfo: UserInfoUrl::new(endpoints.userinfo)?,
            issuer: config.op_issuer.clone(),
        };

        let default_client = ClientCredentials {
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
        };

        let sealer = match config.envelope_key()? {
            Some(key) => Sealer::from_key(&key)?,
            None => Sealer::generate()?,
        };

        let scopes: Vec<Scope> = config.scopes().into_iter().map(Scope::new).collect();

        tracing::info!(
            authorize = %provider.authorize.url(),
            token = %provider.token.url(),
            userinfo = %provider.userinfo.url(),
            client_id = %config.client_id,
            sealer = ?sealer,
            "Relying party state initialized"
        );

        Ok(Self {
            provider: Arc::new(provider),
            default_client: Arc::new(default_client),
            scopes: scopes.into(),
            redirect_url: RedirectUrl::new(config.redirect_url())?,
            sealer: Arc::new(sealer),
            http_client,
            cookie_domain: config.cookie_domain().to_string(),
            flow_cookie_max_age_secs: config.flow_cookie_max_age_secs,
            environment: config.env,
        })
    }
}
