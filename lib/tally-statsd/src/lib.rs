//! Buffered StatsD sample forwarding.
//!
//! Producers hand [`Sample`]s to a [`StatsdCollector`], which holds them in memory and, on a fixed push interval,
//! encodes each one as a DogStatsD counter, gauge or timing and sends the batch over UDP. Shutting the collector down
//! flushes whatever is still pending before the client is closed.
#![deny(missing_docs)]

mod buffer;
pub use self::buffer::SampleBuffer;

pub mod client;
pub use self::client::{ClientError, ClientFactory, MetricsClient};

mod collector;
pub use self::collector::{CollectorHandle, InitError, LifecycleError, LifecycleState, StatsdCollector};

mod config;
pub use self::config::StatsdConfiguration;

pub mod encoder;

mod sample;
pub use self::sample::{MetricKind, Sample, Tags};

mod tags;
pub use self::tags::TagFilter;

#[cfg(test)]
mod test_util;
