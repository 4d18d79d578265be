use std::time::Duration;

use serde::Deserialize;
use serde_with::serde_as;
use tally_config::{
    deser::{DurationMillisOrHuman, OneOrCommaSeparated, PermissiveBool},
    GenericConfiguration,
};
use tally_error::GenericError;

use crate::tags::TagFilter;

const fn default_buffer_size() -> usize {
    20
}

const fn default_push_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_address() -> String {
    "localhost:8125".to_string()
}

/// StatsD forwarding configuration.
///
/// Every key carries the `statsd_` prefix, so the same file can hold logging and other settings side by side.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct StatsdConfiguration {
    /// Endpoint to forward metrics to, as `host:port`.
    ///
    /// Defaults to `localhost:8125`.
    #[serde(rename = "statsd_address", default = "default_address")]
    address: String,

    /// Prefix applied to every forwarded metric name.
    ///
    /// An empty value means no prefix. Defaults to empty.
    #[serde(rename = "statsd_namespace", default)]
    namespace: String,

    /// Number of metric points the client holds before transmitting.
    ///
    /// Defaults to 20.
    #[serde(rename = "statsd_buffer_size", default = "default_buffer_size")]
    buffer_size: usize,

    /// How often pending samples are flushed.
    ///
    /// Defaults to one second.
    #[serde_as(as = "DurationMillisOrHuman")]
    #[serde(rename = "statsd_push_interval", default = "default_push_interval")]
    push_interval: Duration,

    /// Whether sample tags are forwarded at all.
    ///
    /// Defaults to `false`.
    #[serde_as(as = "PermissiveBool")]
    #[serde(rename = "statsd_enable_tags", default)]
    enable_tags: bool,

    /// Tag keys that are never forwarded, when tags are enabled.
    #[serde_as(as = "OneOrCommaSeparated")]
    #[serde(rename = "statsd_tag_blacklist", default)]
    tag_blacklist: Vec<String>,
}

impl StatsdConfiguration {
    /// Creates a configuration for `address`, with every other setting at its default.
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Creates a new `StatsdConfiguration` from the given configuration.
    ///
    /// # Errors
    ///
    /// If any of the `statsd_*` keys hold a value of the wrong type, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(config.as_typed()?)
    }

    /// Sets the namespace prefix.
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the buffer size hint, in metric points.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the push interval.
    pub fn with_push_interval(mut self, push_interval: Duration) -> Self {
        self.push_interval = push_interval;
        self
    }

    /// Enables or disables tag forwarding.
    pub fn with_tags_enabled(mut self, enabled: bool) -> Self {
        self.enable_tags = enabled;
        self
    }

    /// Sets the tag keys that are never forwarded.
    pub fn with_tag_blacklist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_blacklist = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the endpoint address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the namespace prefix, if one is set.
    pub fn namespace(&self) -> Option<&str> {
        Some(self.namespace.as_str()).filter(|ns| !ns.is_empty())
    }

    /// Returns the buffer size hint, in metric points.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the push interval.
    pub fn push_interval(&self) -> Duration {
        self.push_interval
    }

    /// Returns the tag filter implied by this configuration.
    ///
    /// When tags are disabled there is no filter, and no tags are forwarded.
    pub fn tag_filter(&self) -> Option<TagFilter> {
        self.enable_tags
            .then(|| TagFilter::blacklist(self.tag_blacklist.iter().cloned()))
    }
}

impl Default for StatsdConfiguration {
    fn default() -> Self {
        Self {
            address: default_address(),
            namespace: String::new(),
            buffer_size: default_buffer_size(),
            push_interval: default_push_interval(),
            enable_tags: false,
            tag_blacklist: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tally_config::ConfigurationLoader;

    use super::*;
    use crate::sample::Tags;

    fn from_values(values: serde_json::Value) -> StatsdConfiguration {
        let config = ConfigurationLoader::default().from_serialized(values).into_generic();
        StatsdConfiguration::from_configuration(&config).unwrap()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from_values(json!({}));

        assert_eq!(config.address(), "localhost:8125");
        assert_eq!(config.namespace(), None);
        assert_eq!(config.buffer_size(), 20);
        assert_eq!(config.push_interval(), Duration::from_secs(1));
        assert!(config.tag_filter().is_none());
    }

    #[test]
    fn reads_prefixed_keys() {
        let config = from_values(json!({
            "statsd_address": "127.0.0.1:9125",
            "statsd_namespace": "k6",
            "statsd_buffer_size": 50,
            "statsd_push_interval": 250,
        }));

        assert_eq!(config.address(), "127.0.0.1:9125");
        assert_eq!(config.namespace(), Some("k6"));
        assert_eq!(config.buffer_size(), 50);
        assert_eq!(config.push_interval(), Duration::from_millis(250));
    }

    #[test]
    fn push_interval_accepts_human_durations() {
        let config = from_values(json!({ "statsd_push_interval": "1m 30s" }));
        assert_eq!(config.push_interval(), Duration::from_secs(90));

        let config = from_values(json!({ "statsd_push_interval": "500" }));
        assert_eq!(config.push_interval(), Duration::from_millis(500));
    }

    #[test]
    fn tags_enabled_from_string_with_comma_separated_blacklist() {
        let config = from_values(json!({
            "statsd_enable_tags": "true",
            "statsd_tag_blacklist": "vu, iter,",
        }));

        let tags = [("vu", "1"), ("iter", "2"), ("name", "home")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Tags>();

        let filter = config.tag_filter().unwrap();
        assert_eq!(filter.apply(&tags), vec!["name:home"]);
    }

    #[test]
    fn empty_namespace_is_none() {
        let config = StatsdConfiguration::new("localhost:8125").with_namespace("");
        assert_eq!(config.namespace(), None);
    }

    #[test]
    fn invalid_type_is_an_error() {
        let config = ConfigurationLoader::default()
            .from_serialized(json!({ "statsd_buffer_size": "lots" }))
            .into_generic();
        assert!(StatsdConfiguration::from_configuration(&config).is_err());
    }
}
