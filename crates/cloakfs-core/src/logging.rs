//! tracing-subscriber setup for hosts embedding cloakfs

use crate::config::LoggingConfig;
use crate::error::{CloakError, CloakResult};

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already set or the format is unknown.
pub fn init(config: &LoggingConfig) -> CloakResult<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| CloakError::Config(format!("invalid log level {:?}: {e}", config.level)))?;

    let result = match config.format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        "text" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init(),
        other => {
            return Err(CloakError::Config(format!(
                "unknown log format {other:?} (expected \"json\" or \"text\")"
            )))
        }
    };

    result.map_err(|e| CloakError::Config(format!("installing log subscriber: {e}")))
}
