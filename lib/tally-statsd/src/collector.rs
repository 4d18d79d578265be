//! Collector lifecycle and the dispatch loop.

use std::{future::Future, sync::Arc};

use snafu::{ResultExt as _, Snafu};
use tally_error::GenericError;
use tokio::{
    select,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    buffer::SampleBuffer,
    client::{ClientFactory, MetricsClient, UdpClientFactory},
    config::StatsdConfiguration,
    encoder::commit_batch,
    sample::Sample,
    tags::TagFilter,
};

/// Lifecycle state of a [`StatsdCollector`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// Not yet initialized.
    Uninitialized,

    /// Initialized, and either running or ready to run.
    Running,

    /// Shut down. A stopped collector cannot be restarted.
    Stopped,
}

/// A lifecycle ordering error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum LifecycleError {
    /// The collector was run before being initialized.
    #[snafu(display("Collector has not been initialized."))]
    NotInitialized,

    /// The collector was initialized twice.
    #[snafu(display("Collector is already initialized."))]
    AlreadyInitialized,

    /// The collector has already shut down.
    #[snafu(display("Collector has already stopped."))]
    AlreadyStopped,

    /// An earlier run was dropped before its shutdown signal resolved, taking the client with it.
    #[snafu(display("Collector run was interrupted; its client is no longer available."))]
    Interrupted,
}

/// An initialization error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum InitError {
    /// The endpoint address is empty.
    #[snafu(display("Invalid StatsD address '{}': address must not be empty.", address))]
    InvalidAddress {
        /// Configured address.
        address: String,
    },

    /// The push interval is zero.
    #[snafu(display("Invalid push interval: interval must be greater than zero."))]
    InvalidPushInterval,

    /// The network client could not be built.
    #[snafu(display("Failed to create StatsD client for '{}': {}", address, source))]
    ClientConstruction {
        /// Configured address.
        address: String,

        /// Error source.
        source: GenericError,
    },

    /// The collector is not in a state that allows initialization.
    #[snafu(display("Cannot initialize collector: {}", source))]
    Lifecycle {
        /// Error source.
        source: LifecycleError,
    },
}

/// Forwards buffered samples to a StatsD endpoint.
///
/// Samples are accepted at any time through [`collect`][Self::collect] or a [`CollectorHandle`], and held until the
/// dispatch loop driven by [`run`][Self::run] drains them. The loop flushes on every push interval and once more when
/// shut down, then closes the client.
pub struct StatsdCollector {
    config: StatsdConfiguration,
    factory: Box<dyn ClientFactory>,
    tag_filter: Option<TagFilter>,
    buffer: Arc<SampleBuffer>,
    client: Option<Box<dyn MetricsClient>>,
    state: LifecycleState,
}

impl StatsdCollector {
    /// Creates a new `StatsdCollector` from the given configuration.
    ///
    /// The collector sends over UDP, and filters tags as the configuration describes. Nothing is validated or
    /// connected until [`init`][Self::init] is called.
    pub fn new(config: StatsdConfiguration) -> Self {
        let tag_filter = config.tag_filter();
        Self {
            config,
            factory: Box::new(UdpClientFactory),
            tag_filter,
            buffer: Arc::new(SampleBuffer::new()),
            client: None,
            state: LifecycleState::Uninitialized,
        }
    }

    /// Sets the factory used to build the network client.
    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: ClientFactory + 'static,
    {
        self.factory = Box::new(factory);
        self
    }

    /// Sets the tag filter, replacing the one derived from the configuration.
    pub fn with_tag_filter(mut self, tag_filter: TagFilter) -> Self {
        self.tag_filter = Some(tag_filter);
        self
    }

    /// Validates the configuration and builds the network client.
    ///
    /// No network traffic is sent yet.
    ///
    /// # Errors
    ///
    /// If the address is empty, the push interval is zero, or the client cannot be built, an error is returned and the
    /// collector stays uninitialized. If the collector is already running or stopped, an error is returned.
    pub fn init(&mut self) -> Result<(), InitError> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Running => return Err(LifecycleError::AlreadyInitialized).context(Lifecycle),
            LifecycleState::Stopped => return Err(LifecycleError::AlreadyStopped).context(Lifecycle),
        }

        let address = self.config.address();
        if address.trim().is_empty() {
            return InvalidAddress { address }.fail();
        }
        if self.config.push_interval().is_zero() {
            return InvalidPushInterval.fail();
        }

        let client = self
            .factory
            .build(address, self.config.buffer_size(), self.config.namespace())
            .context(ClientConstruction { address })?;

        self.client = Some(client);
        self.state = LifecycleState::Running;

        debug!(
            address,
            namespace = self.config.namespace().unwrap_or_default(),
            buffer_size = self.config.buffer_size(),
            push_interval = ?self.config.push_interval(),
            tags_enabled = self.tag_filter.is_some(),
            "Initialized StatsD collector."
        );

        Ok(())
    }

    /// Returns the configured endpoint address.
    pub fn link(&self) -> &str {
        self.config.address()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns a handle for submitting samples from other tasks or threads.
    pub fn handle(&self) -> CollectorHandle {
        CollectorHandle {
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Buffers every sample in `containers`, in order.
    pub fn collect<I, C>(&self, containers: I)
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Sample>,
    {
        ingest_containers(&self.buffer, containers);
    }

    /// Runs the dispatch loop until `shutdown` resolves.
    ///
    /// Pending samples are flushed every push interval. Once `shutdown` resolves, anything still pending is flushed,
    /// the client is closed, and the collector is stopped.
    ///
    /// The returned future must be driven to completion. Dropping it early skips the final flush and leaves the
    /// collector unable to run again.
    ///
    /// # Errors
    ///
    /// If the collector has not been initialized, has already stopped, or an earlier run was dropped before
    /// completing, an error is returned immediately.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()>,
    {
        match self.state {
            LifecycleState::Uninitialized => return NotInitialized.fail(),
            LifecycleState::Stopped => return AlreadyStopped.fail(),
            LifecycleState::Running => {}
        }
        let Some(mut client) = self.client.take() else {
            return Interrupted.fail();
        };

        let started = Instant::now();
        let push_interval = self.config.push_interval();
        let mut push = interval_at(started + push_interval, push_interval);
        push.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        info!(address = self.link(), "StatsD collector started.");

        loop {
            select! {
                biased;

                _ = &mut shutdown => break,
                _ = push.tick() => self.push_metrics(client.as_mut()),
            }
        }

        debug!("StatsD collector stopping...");

        self.push_metrics(client.as_mut());
        self.finish(client.as_mut(), started);

        Ok(())
    }

    fn push_metrics(&self, client: &mut dyn MetricsClient) {
        let samples = self.buffer.drain_all();
        if samples.is_empty() {
            return;
        }

        match commit_batch(client, &samples, self.tag_filter.as_ref()) {
            Ok(()) => debug!(samples = samples.len(), "Flushed samples."),
            Err(e) => warn!(samples = samples.len(), error = %e, "Error while flushing metrics."),
        }
    }

    fn finish(&mut self, client: &mut dyn MetricsClient, started: Instant) {
        if let Err(e) = client.close() {
            warn!(error = %e, "Error while closing StatsD client.");
        }
        self.state = LifecycleState::Stopped;

        info!(uptime = ?started.elapsed(), "StatsD collector stopped.");
    }
}

/// A cloneable handle for submitting samples to a [`StatsdCollector`].
///
/// Handles stay usable while the collector is running, and after it has stopped, although samples submitted after the
/// final flush are never sent.
#[derive(Clone, Debug)]
pub struct CollectorHandle {
    buffer: Arc<SampleBuffer>,
}

impl CollectorHandle {
    /// Buffers every sample in `containers`, in order.
    pub fn collect<I, C>(&self, containers: I)
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Sample>,
    {
        ingest_containers(&self.buffer, containers);
    }
}

fn ingest_containers<I, C>(buffer: &SampleBuffer, containers: I)
where
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Sample>,
{
    buffer.ingest(containers.into_iter().flatten().collect());
}
