use std::collections::BTreeMap;

use serde::Deserialize;

/// Tags attached to a sample.
///
/// Keys are unique and iterate in lexicographic order, which keeps the rendered tag list stable from one flush to the
/// next.
pub type Tags = BTreeMap<String, String>;

/// The kind of a metric, which determines how its samples are encoded on the wire.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A cumulative count. Each sample is sent as a counter increment.
    Counter,

    /// A distribution of observations, in milliseconds. Each sample is sent as a timing.
    #[serde(alias = "timing")]
    Trend,

    /// A point-in-time value. Each sample is sent as a gauge.
    Gauge,

    /// A ratio of non-zero samples. Samples tagged with `check` become pass/fail counters.
    Rate,
}

/// A single measurement.
///
/// Samples are immutable once built: the builder-style methods consume the sample and are meant to be chained at
/// creation time.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Sample {
    metric: String,
    value: f64,
    #[serde(alias = "type")]
    kind: MetricKind,
    #[serde(default)]
    tags: Tags,
}

impl Sample {
    /// Creates a new, untagged sample.
    pub fn new<S: Into<String>>(metric: S, value: f64, kind: MetricKind) -> Self {
        Self {
            metric: metric.into(),
            value,
            kind,
            tags: Tags::new(),
        }
    }

    /// Creates a new counter sample.
    pub fn counter<S: Into<String>>(metric: S, value: f64) -> Self {
        Self::new(metric, value, MetricKind::Counter)
    }

    /// Creates a new trend sample, with `millis` as the observed duration.
    pub fn trend<S: Into<String>>(metric: S, millis: f64) -> Self {
        Self::new(metric, millis, MetricKind::Trend)
    }

    /// Creates a new gauge sample.
    pub fn gauge<S: Into<String>>(metric: S, value: f64) -> Self {
        Self::new(metric, value, MetricKind::Gauge)
    }

    /// Creates a new rate sample.
    pub fn rate<S: Into<String>>(metric: S, value: f64) -> Self {
        Self::new(metric, value, MetricKind::Rate)
    }

    /// Adds a tag, replacing any existing value for `key`.
    pub fn with_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Replaces all tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Returns the metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Returns the measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Returns the tags.
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Returns the value of the tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_from_json() {
        let sample: Sample = serde_json::from_value(json!({
            "metric": "http_req_duration",
            "value": 12.5,
            "kind": "timing",
            "tags": { "status": "200", "method": "GET" },
        }))
        .unwrap();

        assert_eq!(sample.metric(), "http_req_duration");
        assert_eq!(sample.kind(), MetricKind::Trend);
        assert_eq!(sample.tag("status"), Some("200"));
        assert_eq!(
            sample.tags().keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["method", "status"]
        );
    }

    #[test]
    fn type_is_accepted_as_kind_and_tags_are_optional() {
        let sample: Sample = serde_json::from_value(json!({ "metric": "vus", "value": 10, "type": "gauge" })).unwrap();

        assert_eq!(sample, Sample::gauge("vus", 10.0));
        assert!(sample.tags().is_empty());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = serde_json::from_value::<Sample>(json!({ "metric": "x", "value": 1, "kind": "histogram" }));
        assert!(result.is_err());
    }

    #[test]
    fn with_tag_replaces_existing_value() {
        let sample = Sample::rate("checks", 1.0).with_tag("check", "a").with_tag("check", "b");
        assert_eq!(sample.tag("check"), Some("b"));
        assert_eq!(sample.tags().len(), 1);
    }
}
