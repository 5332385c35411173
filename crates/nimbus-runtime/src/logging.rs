#![forbid(unsafe_code)]

//! Subscriber setup for hosts that do not install their own.
//!
//! Filtering follows `RUST_LOG` and defaults to `info`. Nimbus itself logs
//! store requests at `debug`, timeouts at `warn`, and updater transitions
//! at `trace`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Install a global subscriber with JSON or plain text output.
///
/// Fails when a global subscriber is already set.
pub fn init(json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}
