use swaig_core::config::{AppConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber; stdout is reserved for command payloads.
///
/// `verbose` forces `debug` regardless of the configured level. Without a
/// loadable config the defaults apply.
pub fn init(config: Option<&AppConfig>, verbose: bool) {
    let defaults = AppConfig::default();
    let logging = &config.unwrap_or(&defaults).logging;

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
