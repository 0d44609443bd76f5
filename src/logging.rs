use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use icn_config::DatastoreConfig;

use crate::{DatastoreError, DatastoreResult};

/// Install the global console subscriber.
///
/// `RUST_LOG` overrides `log_level` when set. Fails if a global subscriber
/// is already installed.
pub fn init_logging(log_level: &str) -> DatastoreResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| {
            DatastoreError::Logging(format!("Invalid log level `{}`: {}", log_level, e))
        })?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .map_err(|e| DatastoreError::Logging(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Install the global subscriber at the configured `log_level`
pub fn init_from_config(config: &DatastoreConfig) -> DatastoreResult<()> {
    init_logging(&config.log_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error() {
        let mut config = DatastoreConfig::with_database("heap");
        config.log_level = "debug".to_string();
        let first = init_from_config(&config);
        let second = init_logging(&config.log_level);
        // Another test in this binary may have installed a subscriber first.
        assert!(first.is_err() || second.is_err());
        assert!(matches!(second, Err(DatastoreError::Logging(_))));
    }
}
