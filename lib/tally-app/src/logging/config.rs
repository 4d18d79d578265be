use serde::Deserialize;
use serde_with::serde_as;
use tally_config::{deser::PermissiveBool, GenericConfiguration};
use tally_error::{generic_error, ErrorContext as _, GenericError};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn default_log_level() -> LogLevel {
    LogLevel(LevelFilter::INFO.to_string().to_lowercase())
}

/// Logging configuration.
///
/// Read from the `log_level` and `log_format_json` keys (`TALLY_LOG_LEVEL` and `TALLY_LOG_FORMAT_JSON` when the
/// environment is loaded with the `tally` prefix).
#[serde_as]
#[derive(Deserialize)]
pub struct LoggingConfiguration {
    #[serde(default = "default_log_level")]
    log_level: LogLevel,

    #[serde_as(as = "PermissiveBool")]
    #[serde(default)]
    log_format_json: bool,
}

impl LoggingConfiguration {
    /// Creates a new `LoggingConfiguration` from the given configuration.
    ///
    /// # Errors
    ///
    /// If the configuration cannot be deserialized as `LoggingConfiguration`, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(config.as_typed()?)
    }

    pub(super) fn level_filter(&self) -> EnvFilter {
        EnvFilter::builder().parse_lossy(&self.log_level.0)
    }

    #[cfg(test)]
    fn level_directives(&self) -> &str {
        &self.log_level.0
    }

    pub(super) fn format_json(&self) -> bool {
        self.log_format_json
    }
}

/// Filtering directives, validated when deserialized.
#[derive(Deserialize)]
#[serde(try_from = "String")]
struct LogLevel(String);

impl TryFrom<String> for LogLevel {
    type Error = GenericError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(generic_error!("Log level cannot be empty."));
        }

        EnvFilter::builder()
            .parse(&value)
            .error_context("Failed to parse valid log level.")?;

        Ok(Self(value))
    }
}
