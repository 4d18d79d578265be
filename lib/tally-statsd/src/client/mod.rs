//! Network clients.
//!
//! The collector talks to its endpoint through [`MetricsClient`], and builds that client through [`ClientFactory`] at
//! initialization time. [`UdpStatsdClient`] is the production implementation.

use std::io;

use cadence::MetricError;
use snafu::Snafu;
use tally_error::GenericError;

mod udp;
pub use self::udp::{UdpClientFactory, UdpStatsdClient};

/// A client error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ClientError {
    /// A metric point could not be written.
    #[snafu(display("Failed to send metric '{}'.", metric))]
    Emit {
        /// Name of the metric, as given to the client.
        metric: String,

        /// Error source.
        source: MetricError,
    },

    /// Buffered metric points could not be transmitted.
    #[snafu(display("Failed to flush buffered metrics."))]
    Flush {
        /// Error source.
        source: io::Error,
    },

    /// The client was already closed.
    #[snafu(display("Client is closed."))]
    Closed,
}

/// A client that transmits individual metric points.
///
/// Every point is sent with a sample rate of 1. Implementations may buffer points until [`flush`][Self::flush] is
/// called. Once [`close`][Self::close] returns, every method fails with [`ClientError::Closed`].
pub trait MetricsClient: Send {
    /// Increments the counter `name` by `delta`.
    fn count(&mut self, name: &str, delta: i64, tags: &[String]) -> Result<(), ClientError>;

    /// Sets the gauge `name` to `value`.
    fn gauge(&mut self, name: &str, value: f64, tags: &[String]) -> Result<(), ClientError>;

    /// Records a timing observation of `millis` milliseconds for `name`.
    fn timing_millis(&mut self, name: &str, millis: f64, tags: &[String]) -> Result<(), ClientError>;

    /// Transmits all buffered metric points.
    fn flush(&mut self) -> Result<(), ClientError>;

    /// Flushes any buffered metric points and releases the client.
    fn close(&mut self) -> Result<(), ClientError>;
}

/// Builds a [`MetricsClient`] for an endpoint.
pub trait ClientFactory: Send + Sync {
    /// Builds a client bound to `address`.
    ///
    /// `buffer_size` is a hint for how many metric points to hold before transmitting. When `namespace` is given,
    /// every metric name sent through the client is prefixed with it.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, such as when the address is malformed, an error is returned.
    fn build(
        &self, address: &str, buffer_size: usize, namespace: Option<&str>,
    ) -> Result<Box<dyn MetricsClient>, GenericError>;
}
