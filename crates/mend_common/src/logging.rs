//! Logging setup
//!
//! Library code only emits `tracing` events. Binaries call [`init`] once to
//! install a fmt subscriber; `$MEND_LOG` takes precedence over the
//! configured filter.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive
pub const LOG_ENV: &str = "MEND_LOG";

/// Build the filter: `$MEND_LOG` if set and valid, else `default_filter`, else `info`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber, writing to stderr. Safe to call twice:
/// the second call is a no-op.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
