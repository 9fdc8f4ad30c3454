//! Diagnostic logging.
//!
//! User-facing progress goes to stdout with `println!`. Everything else
//! (pipeline steps, fallbacks, best-effort failures) is emitted through
//! `tracing` and rendered on stderr.
//!
//! `RUST_LOG` takes precedence. Without it the filter is `gvs=warn`, or
//! `gvs=debug` with `--verbose`. Setting `GVS_LOG_JSON` switches to JSON lines.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable enabling JSON log output.
pub const LOG_JSON_ENV: &str = "GVS_LOG_JSON";

/// Installs the global tracing subscriber.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "gvs=debug" } else { "gvs=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var_os(LOG_JSON_ENV).is_some() {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true);
        let _ = registry.with(json_layer).try_init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time();
        let _ = registry.with(fmt_layer).try_init();
    }
}
