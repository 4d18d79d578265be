//! Logging.

use tally_error::{ErrorContext as _, GenericError};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _, Layer};

mod config;
pub use self::config::LoggingConfiguration;

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// Events are filtered by the directives in `log_level` (default `info`) and written to standard error, either as
/// human-readable lines or, when `log_format_json` is set, as one JSON object per line.
///
/// # Errors
///
/// If a global subscriber was already installed, an error will be returned.
pub fn initialize_logging(config: &LoggingConfiguration) -> Result<(), GenericError> {
    let filter = config.level_filter();

    if config.format_json() {
        tracing_subscriber::registry()
            .with(json_layer().with_filter(filter))
            .try_init()
            .error_context("Failed to install JSON logging subscriber.")?;
    } else {
        tracing_subscriber::registry()
            .with(pretty_layer().with_filter(filter))
            .try_init()
            .error_context("Failed to install logging subscriber.")?;
    }

    Ok(())
}

fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
}

fn pretty_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .with_target(true)
        .with_writer(std::io::stderr)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tally_config::ConfigurationLoader;

    use super::*;

    #[test]
    fn second_initialization_fails() {
        let config = ConfigurationLoader::default()
            .from_serialized(json!({ "log_level": "debug" }))
            .into_generic();
        let logging_config = LoggingConfiguration::from_configuration(&config).unwrap();

        initialize_logging(&logging_config).unwrap();
        assert!(initialize_logging(&logging_config).is_err());
    }
}
