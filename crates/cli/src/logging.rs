use tidy_core::config::{AppConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Logs go to stderr so they never interleave
/// with the conversation on stdout.
///
/// Returns `false` when a global subscriber was already installed; the first
/// one stays in place.
pub fn init_logging(config: &AppConfig) -> bool {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    match installed {
        Ok(()) => true,
        // try_init only fails when a global default subscriber already exists.
        Err(error) => {
            tracing::debug!(
                event_name = "system.logging.already_initialized",
                error = %error,
                "keeping existing tracing subscriber"
            );
            false
        }
    }
}
