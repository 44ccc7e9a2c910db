//! Tracing subscriber setup for hosts embedding the probe core

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber when `debug` is set
///
/// Honors `RUST_LOG` directives and raises the default level to TRACE so
/// the per-event lines are visible. Returns `false` if debug output was not
/// requested or a global subscriber is already installed.
pub fn init_tracing(debug: bool) -> bool {
    if !debug {
        return false;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
