//! Encoding samples as client calls.

use tracing::warn;

use crate::{
    client::{ClientError, MetricsClient},
    sample::{MetricKind, Sample},
    tags::TagFilter,
};

/// Tag that turns a rate sample into a pass/fail check counter.
pub const CHECK_TAG: &str = "check";

/// Returns the name of the derived counter for a check sample: `check.<name>.pass`, or `check.<name>.fail` when
/// `value` is zero.
pub fn check_metric_name(check: &str, value: f64) -> String {
    let label = if value == 0.0 { "fail" } else { "pass" };
    format!("check.{}.{}", check, label)
}

/// Sends a single sample through `client`.
///
/// Tags are sent only when a filter is given, and the same filtered tags accompany every call, including the derived
/// check counter.
///
/// # Errors
///
/// If the client fails to accept the metric point, an error is returned.
pub fn try_dispatch(
    client: &mut dyn MetricsClient, sample: &Sample, tag_filter: Option<&TagFilter>,
) -> Result<(), ClientError> {
    let tags = tag_filter.map(|filter| filter.apply(sample.tags())).unwrap_or_default();

    match sample.kind() {
        MetricKind::Counter => client.count(sample.metric(), sample.value() as i64, &tags),
        MetricKind::Trend => client.timing_millis(sample.metric(), sample.value(), &tags),
        MetricKind::Gauge => client.gauge(sample.metric(), sample.value(), &tags),
        MetricKind::Rate => match sample.tag(CHECK_TAG).filter(|check| !check.is_empty()) {
            Some(check) => client.count(&check_metric_name(check, sample.value()), 1, &tags),
            None => client.count(sample.metric(), sample.value() as i64, &tags),
        },
    }
}

/// Sends a single sample through `client`, logging any failure.
pub fn dispatch(client: &mut dyn MetricsClient, sample: &Sample, tag_filter: Option<&TagFilter>) {
    if let Err(e) = try_dispatch(client, sample, tag_filter) {
        warn!(metric = sample.metric(), error = %e, "Error while sending metric.");
    }
}

/// Sends every sample in `samples`, in order, and then flushes the client once.
///
/// A sample that fails to send is logged and skipped.
///
/// # Errors
///
/// If the final flush fails, its error is returned. Nothing is retried.
pub fn commit_batch(
    client: &mut dyn MetricsClient, samples: &[Sample], tag_filter: Option<&TagFilter>,
) -> Result<(), ClientError> {
    for sample in samples {
        dispatch(client, sample, tag_filter);
    }
    client.flush()
}
