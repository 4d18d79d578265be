use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use cadence::MetricError;
use snafu::ResultExt as _;
use tally_error::{generic_error, GenericError};

use crate::client::{ClientError, ClientFactory, Emit, Flush, MetricsClient};

/// A call made against a [`RecordingClient`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Count { name: String, delta: i64, tags: Vec<String> },
    Gauge { name: String, value: f64, tags: Vec<String> },
    Timing { name: String, millis: f64, tags: Vec<String> },
    Flush,
    Close,
}

fn owned_tags(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

impl Call {
    pub fn count(name: &str, delta: i64, tags: &[&str]) -> Self {
        Self::Count {
            name: name.to_string(),
            delta,
            tags: owned_tags(tags),
        }
    }

    pub fn gauge(name: &str, value: f64, tags: &[&str]) -> Self {
        Self::Gauge {
            name: name.to_string(),
            value,
            tags: owned_tags(tags),
        }
    }

    pub fn timing(name: &str, millis: f64, tags: &[&str]) -> Self {
        Self::Timing {
            name: name.to_string(),
            millis,
            tags: owned_tags(tags),
        }
    }
}

/// A client that records every call instead of sending anything.
///
/// Clones share the same call log. Failed emissions are not recorded, while failed flushes and closes are.
#[derive(Clone, Debug, Default)]
pub struct RecordingClient {
    calls: Arc<Mutex<Vec<Call>>>,
    failing_metric: Option<String>,
    fail_flush: bool,
    fail_all: bool,
}

impl RecordingClient {
    /// Fails every emission for `name`.
    pub fn failing_metric(mut self, name: &str) -> Self {
        self.failing_metric = Some(name.to_string());
        self
    }

    /// Fails every flush.
    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    /// Fails every call.
    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self.fail_flush = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Flush).count()
    }

    fn emit(&self, name: &str, call: Call) -> Result<(), ClientError> {
        if self.fail_all || self.failing_metric.as_deref() == Some(name) {
            let e = MetricError::from(io::Error::new(io::ErrorKind::Other, "rejected"));
            return Err(e).context(Emit { metric: name });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl MetricsClient for RecordingClient {
    fn count(&mut self, name: &str, delta: i64, tags: &[String]) -> Result<(), ClientError> {
        let call = Call::Count {
            name: name.to_string(),
            delta,
            tags: tags.to_vec(),
        };
        self.emit(name, call)
    }

    fn gauge(&mut self, name: &str, value: f64, tags: &[String]) -> Result<(), ClientError> {
        let call = Call::Gauge {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        };
        self.emit(name, call)
    }

    fn timing_millis(&mut self, name: &str, millis: f64, tags: &[String]) -> Result<(), ClientError> {
        let call = Call::Timing {
            name: name.to_string(),
            millis,
            tags: tags.to_vec(),
        };
        self.emit(name, call)
    }

    fn flush(&mut self) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(Call::Flush);
        if self.fail_flush {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")).context(Flush);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(Call::Close);
        if self.fail_all {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")).context(Flush);
        }
        Ok(())
    }
}

/// A factory that hands out a shared [`RecordingClient`] and records how it was asked to build it.
#[derive(Clone, Debug, Default)]
pub struct RecordingFactory {
    client: RecordingClient,
    builds: Arc<AtomicUsize>,
    build_args: Arc<Mutex<Vec<(String, usize, Option<String>)>>>,
    fail: bool,
}

impl RecordingFactory {
    /// Fails every build.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Builds clients that fail every call.
    pub fn failing_client(mut self) -> Self {
        self.client = self.client.failing_all();
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn build_args(&self) -> Vec<(String, usize, Option<String>)> {
        self.build_args.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.client.calls()
    }
}

impl ClientFactory for RecordingFactory {
    fn build(
        &self, address: &str, buffer_size: usize, namespace: Option<&str>,
    ) -> Result<Box<dyn MetricsClient>, GenericError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.build_args
            .lock()
            .unwrap()
            .push((address.to_string(), buffer_size, namespace.map(String::from)));

        if self.fail {
            return Err(generic_error!("malformed address '{}'", address));
        }
        Ok(Box::new(self.client.clone()))
    }
}
