//! Outbound HTTP pipeline.
//!
//! Requests are built against a shared `reqwest::Client`, passed through a
//! chain of [`Interceptor`]s, then dispatched. The [`BearerInterceptor`]
//! attaches the cached external API token to requests addressed to that API.

pub mod interceptor;
pub mod pipeline;

pub use interceptor::{BearerInterceptor, Interceptor, TokenSource};
pub use pipeline::HttpPipeline;
