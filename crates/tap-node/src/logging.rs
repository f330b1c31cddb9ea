use shared::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default verbosity per crate when `RUST_LOG` is unset.
///
/// The handshake crates follow the chosen format's level; the platform
/// BLE stack stays at warn because it logs every advertisement.
fn default_directives(format: LogFormat) -> String {
    let level = match format {
        LogFormat::Json => "info",
        LogFormat::Pretty => "debug",
    };
    format!(
        "warn,tap_node={level},proximity={level},shared={level},btleplug=warn",
        level = level
    )
}

fn env_filter(format: LogFormat) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(format)))
}

/// Install the global subscriber: JSON lines for deployments, pretty
/// output for a terminal
pub fn init_logging(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter(format));
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .json(),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .init(),
    }

    tracing::info!(format = ?format, "Logging initialized");
}
