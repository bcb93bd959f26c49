//! Tracing setup for the CLI
//!
//! Library crates only emit events; the binary decides where they go.
//! Logs are written to stderr so stdout stays machine-readable.
//!
//! Set `RUST_LOG` to override the default filter:
//! ```bash
//! RUST_LOG=clipfeed_core=debug clipfeed-cli simulate script.json
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "clipfeed=info";

/// Install the global subscriber; a second call is a no-op
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .compact(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
