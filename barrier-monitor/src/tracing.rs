//! Logging setup and the prelude used throughout the crate.

use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` is set) records go to journald with
/// structured fields intact. Everywhere else they are formatted to stdout.
///
/// Must be called before the tokio runtime starts: the local UTC offset can
/// only be determined reliably while the process is single-threaded.
pub fn init_journald_or_stdout() {
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable, logging to stdout: {e}"),
        }
    }

    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_timer(timer))
        .init();
}
