#![forbid(unsafe_code)]
//! jitcall client core: authentication state, the external API session
//! bridge, navigation guarding and the outbound request pipeline.

pub mod app;
pub mod auth;
pub mod config;
pub mod guard;
pub mod http;
pub mod integrations;
pub mod logging;
pub mod profile;

pub use app::App;
pub use auth::{
    AuthError, Credentials, ExternalTokenManager, IdentityProvider, IdentityService,
    ProviderError, ProviderErrorCode, Session, SessionFeed,
};
pub use config::Config;
pub use guard::{decide, RouteDecision, RouteGuard};
pub use http::{BearerInterceptor, HttpPipeline};
