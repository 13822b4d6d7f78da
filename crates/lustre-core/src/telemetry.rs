//! Log subscriber setup for binaries embedding the core.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Installs a stderr fmt subscriber. `RUST_LOG` wins over `level`; an
/// unparsable level falls back to `info`. Calling it again is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    // Fails only when a global subscriber is already set.
    let _ = Registry::default().with(filter).with(console).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init("debug");
        init("not a level [");
        tracing::info!(target: "lustre::telemetry", "still logging");
    }
}
