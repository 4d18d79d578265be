use std::{
    io,
    net::{SocketAddr, ToSocketAddrs as _, UdpSocket},
    sync::Arc,
};

use cadence::{BufferedUdpMetricSink, Counted as _, Gauged as _, MetricBuilder, MetricError, MetricSink, StatsdClient};
use snafu::ResultExt as _;
use tally_error::{generic_error, ErrorContext as _, GenericError};
use tracing::debug;

use super::{ClientError, ClientFactory, Closed, Emit, Flush, MetricsClient};

/// Rough size of one rendered metric point, used to turn a point-count hint into a byte capacity.
const APPROX_METRIC_BYTES: usize = 64;

/// Largest payload that fits in a single unfragmented datagram on common networks.
const MAX_DATAGRAM_BYTES: usize = 1432;

/// Sink shared between the `cadence` client, which writes to it, and [`UdpStatsdClient`], which flushes it.
struct SharedSink(Arc<BufferedUdpMetricSink>);

impl MetricSink for SharedSink {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        self.0.emit(metric)
    }

    fn flush(&self) -> io::Result<()> {
        self.0.flush()
    }
}

/// A DogStatsD client that batches metric points into UDP datagrams.
///
/// Points accumulate in a buffer of roughly `buffer_size` points (capped at one datagram) and are sent when the buffer
/// fills or when the client is flushed. Tags use the DogStatsD `|#tag1,tag2` extension.
pub struct UdpStatsdClient {
    client: StatsdClient,
    sink: Arc<BufferedUdpMetricSink>,
    prefix: String,
    endpoint: SocketAddr,
    closed: bool,
}

impl UdpStatsdClient {
    /// Creates a client that sends to `address`.
    ///
    /// # Errors
    ///
    /// If `address` cannot be resolved, or a local socket cannot be bound, an error is returned.
    pub fn connect(address: &str, buffer_size: usize, namespace: Option<&str>) -> Result<Self, GenericError> {
        let endpoint = address
            .to_socket_addrs()
            .with_error_context(|| format!("Failed to resolve StatsD address '{}'.", address))?
            .next()
            .ok_or_else(|| generic_error!("StatsD address '{}' did not resolve to any socket address.", address))?;

        let bind_addr: SocketAddr = if endpoint.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).error_context("Failed to bind local UDP socket.")?;
        socket
            .set_nonblocking(true)
            .error_context("Failed to set UDP socket to non-blocking mode.")?;

        let capacity = buffer_capacity_bytes(buffer_size);
        let sink = BufferedUdpMetricSink::with_capacity(endpoint, socket, capacity)
            .error_context("Failed to create buffered UDP sink.")?;
        let sink = Arc::new(sink);

        let client = StatsdClient::builder(namespace.unwrap_or_default(), SharedSink(Arc::clone(&sink))).build();

        debug!(%endpoint, capacity, namespace = namespace.unwrap_or_default(), "Created StatsD UDP client.");

        Ok(Self {
            client,
            sink,
            prefix: metric_prefix(namespace),
            endpoint,
            closed: false,
        })
    }

    /// Returns the resolved endpoint.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            Closed.fail()
        } else {
            Ok(())
        }
    }
}

/// Normalizes a namespace the same way `cadence` does: no trailing dots, then a single `.` separator.
fn metric_prefix(namespace: Option<&str>) -> String {
    match namespace.map(|ns| ns.trim_end_matches('.')) {
        Some(ns) if !ns.is_empty() => format!("{}.", ns),
        _ => String::new(),
    }
}

/// Renders a DogStatsD timer line, keeping fractional milliseconds.
fn render_timing(prefix: &str, name: &str, millis: f64, tags: &[String]) -> String {
    let mut line = format!("{}{}:{}|ms", prefix, name, millis);
    if !tags.is_empty() {
        line.push_str("|#");
        line.push_str(&tags.join(","));
    }
    line
}

fn buffer_capacity_bytes(buffer_size: usize) -> usize {
    buffer_size.max(1).saturating_mul(APPROX_METRIC_BYTES).min(MAX_DATAGRAM_BYTES)
}

fn send_tagged<'m, T>(mut builder: MetricBuilder<'m, '_, T>, name: &str, tags: &'m [String]) -> Result<(), ClientError>
where
    T: cadence::Metric + From<String>,
{
    for tag in tags {
        builder = builder.with_tag_value(tag);
    }
    builder.try_send().map(drop).context(Emit { metric: name })
}

impl MetricsClient for UdpStatsdClient {
    fn count(&mut self, name: &str, delta: i64, tags: &[String]) -> Result<(), ClientError> {
        self.ensure_open()?;
        send_tagged(self.client.count_with_tags(name, delta), name, tags)
    }

    fn gauge(&mut self, name: &str, value: f64, tags: &[String]) -> Result<(), ClientError> {
        self.ensure_open()?;
        send_tagged(self.client.gauge_with_tags(name, value), name, tags)
    }

    fn timing_millis(&mut self, name: &str, millis: f64, tags: &[String]) -> Result<(), ClientError> {
        self.ensure_open()?;
        // `cadence` timers only take whole milliseconds, so the line is written to the shared sink directly.
        if !millis.is_finite() {
            let e = io::Error::new(io::ErrorKind::InvalidInput, "timing value is not finite");
            return Err(MetricError::from(e)).context(Emit { metric: name });
        }
        let line = render_timing(&self.prefix, name, millis, tags);
        self.sink
            .emit(&line)
            .map(drop)
            .map_err(MetricError::from)
            .context(Emit { metric: name })
    }

    fn flush(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.sink.flush().context(Flush)
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.closed = true;
        self.sink.flush().context(Flush)
    }
}

/// Builds [`UdpStatsdClient`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpClientFactory;

impl ClientFactory for UdpClientFactory {
    fn build(
        &self, address: &str, buffer_size: usize, namespace: Option<&str>,
    ) -> Result<Box<dyn MetricsClient>, GenericError> {
        Ok(Box::new(UdpStatsdClient::connect(address, buffer_size, namespace)?))
    }
}
