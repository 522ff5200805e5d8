//! Tracing Initialization
//!
//! Configures the global `tracing` subscriber with an environment filter and
//! a compact fmt layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level directives (default: `config_console=info`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Call once at startup, before any task is spawned.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "config_console=info"
            .parse()
            .expect("static directive 'config_console=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
