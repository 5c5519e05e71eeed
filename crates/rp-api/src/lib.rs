//! OpenID Connect relying party: login redirect, callback and shared plumbing.

pub mod config;
pub mod error;
pub mod flow;
pub mod metrics;
/// HTTP middleware shared by every route.
pub mod middleware;
pub mod router;
pub mod state;
pub mod tracing;

pub use config::ApiConfig;
pub use state::{ApiState, ClientCredentials, ProviderEndpoints};
