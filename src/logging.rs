//! Tracing setup for the CLI.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVE: &str = "jitcall=info";

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
/// Calling this more than once is harmless.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
