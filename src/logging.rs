//! Log output for the `nfd` binary. The library itself only emits
//! `tracing` events and leaves subscribing to the application.

use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "nfd=info,warn";

/// Installs a stderr subscriber filtered by `RUST_LOG`, or by
/// [`DEFAULT_FILTER`] when that is unset or invalid.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    init_with(filter);
}

/// Like [`init_tracing`] but with an explicit filter, e.g. `"nfd=trace"`.
pub fn init_tracing_with_filter(filter: &str) {
    init_with(EnvFilter::new(filter));
}

fn init_with(filter: EnvFilter) {
    // Output goes to stderr; stdout carries the selected paths.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
