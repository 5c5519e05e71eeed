//! Environment-driven configuration.

use std::{fmt, net::SocketAddr};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::flow::CALLBACK_PATH;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "RP_";

/// Deployment environment, from `RP_ENV`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: pretty logs, no `Secure` cookies, no HSTS.
    Development,
    /// Default.
    #[default]
    Production,
}

impl Environment {
    /// Whether this is `Development`.
    pub const fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Whether this is `Production`.
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Configuration that cannot start the service.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable is missing or has the wrong type.
    #[error("failed to read configuration from the environment: {0}")]
    Env(#[from] envy::Error),
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    /// Neither the named override nor `RP_OP_HOST` is set.
    #[error("{0} is not set and RP_OP_HOST is missing")]
    MissingEndpoint(&'static str),
    /// The envelope key is not valid base64.
    #[error("RP_ENVELOPE_KEY is not valid base64")]
    EnvelopeKey,
}

/// OP endpoint URLs resolved from explicit overrides or `RP_OP_HOST`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointUrls {
    /// Authorization endpoint.
    pub authorize: String,
    /// Token endpoint.
    pub token: String,
    /// Userinfo endpoint.
    pub userinfo: String,
}

/// Relying party configuration, read from `RP_*` environment variables.
#[derive(Clone, Deserialize, Validate)]
pub struct ApiConfig {
    /// Public hostname of this RP, optionally with a port.
    #[validate(length(min = 1))]
    pub ext_host: String,
    /// OP hostname the default endpoint URLs are derived from.
    pub op_host: Option<String>,
    /// Overrides the derived authorization endpoint.
    #[validate(url)]
    pub op_authorize_url: Option<String>,
    /// Overrides the derived token endpoint.
    #[validate(url)]
    pub op_token_url: Option<String>,
    /// Overrides the derived userinfo endpoint.
    #[validate(url)]
    pub op_userinfo_url: Option<String>,
    /// Expected ID token `iss`; unchecked when unset.
    pub op_issuer: Option<String>,
    /// Default client ID.
    #[validate(length(min = 1))]
    pub client_id: String,
    /// Default client secret, also the HMAC key for assertions and ID tokens.
    #[validate(length(min = 1))]
    pub client_secret: String,
    /// Space delimited scopes requested in addition to `openid`.
    #[serde(default)]
    pub scope: String,
    /// `development` or `production`.
    #[serde(default)]
    pub env: Environment,
    /// Listen address, `0.0.0.0:3000` by default.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Flow cookie lifetime.
    #[serde(default = "default_flow_cookie_max_age_secs")]
    #[validate(range(min = 1))]
    pub flow_cookie_max_age_secs: i64,
    /// Inbound and outbound HTTP timeout.
    #[serde(default = "default_http_timeout_secs")]
    #[validate(range(min = 1))]
    pub http_timeout_secs: u64,
    /// Base64 AES key; a random per-process key is used when unset.
    pub envelope_key: Option<String>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

const fn default_flow_cookie_max_age_secs() -> i64 {
    300
}

const fn default_http_timeout_secs() -> u64 {
    600
}

impl ApiConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Read the configuration from an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        // Surface endpoint and key problems before anything is built from them
        config.endpoints()?;
        config.envelope_key()?;
        Ok(config)
    }

    /// OP endpoint URLs, explicit overrides first.
    pub fn endpoints(&self) -> Result<EndpointUrls, ConfigError> {
        let resolve = |explicit: &Option<String>, var: &'static str, path: &str| {
            explicit
                .clone()
                .or_else(|| {
                    self.op_host
                        .as_deref()
                        .filter(|host| !host.is_empty())
                        .map(|host| format!("https://{host}/openId/{path}"))
                })
                .ok_or(ConfigError::MissingEndpoint(var))
        };

        Ok(EndpointUrls {
            authorize: resolve(&self.op_authorize_url, "RP_OP_AUTHORIZE_URL", "authenticate")?,
            token: resolve(&self.op_token_url, "RP_OP_TOKEN_URL", "token")?,
            userinfo: resolve(&self.op_userinfo_url, "RP_OP_USERINFO_URL", "userinfo")?,
        })
    }

    /// The fixed callback URL registered with the OP.
    pub fn redirect_url(&self) -> String {
        format!("https://{}{CALLBACK_PATH}", self.ext_host)
    }

    /// `ext_host` without any port suffix.
    pub fn cookie_domain(&self) -> &str {
        match self.ext_host.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => host,
            _ => &self.ext_host,
        }
    }

    /// Extra scopes, without duplicates or a repeated `openid`.
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for scope in self.scope.split_whitespace() {
            if scope != "openid" && !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        scopes
    }

    /// Decoded `RP_ENVELOPE_KEY`, if set.
    pub fn envelope_key(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        self.envelope_key
            .as_deref()
            .map(|key| STANDARD.decode(key.trim()).map_err(|_| ConfigError::EnvelopeKey))
            .transpose()
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("ext_host", &self.ext_host)
            .field("op_host", &self.op_host)
            .field("op_authorize_url", &self.op_authorize_url)
            .field("op_token_url", &self.op_token_url)
            .field("op_userinfo_url", &self.op_userinfo_url)
            .field("op_issuer", &self.op_issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scope", &self.scope)
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("flow_cookie_max_age_secs", &self.flow_cookie_max_age_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field(
                "envelope_key",
                &self.envelope_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
