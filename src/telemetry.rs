//! Process-wide tracing setup.

use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Install a stderr fmt subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when the variable is unset or invalid.
///
/// Only the first call has an effect. Stdout is left alone so it can carry
/// machine-readable output.
pub fn init_tracing(default_filter: &str) {
    INITIALISED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);
        if let Err(err) = Registry::default().with(filter).with(fmt_layer).try_init() {
            eprintln!("failed to initialise tracing subscriber: {err}");
        }
    });
}
