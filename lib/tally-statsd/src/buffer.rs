use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::sample::Sample;

/// Pending samples, shared between producers and the dispatch loop.
///
/// The lock is held only to append or to swap the pending samples out, never while samples are encoded or sent.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    pending: Mutex<Vec<Sample>>,
}

impl SampleBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `samples`, in order. Does nothing if `samples` is empty.
    pub fn ingest(&self, mut samples: Vec<Sample>) {
        if samples.is_empty() {
            return;
        }

        let mut pending = self.lock();
        if pending.is_empty() {
            *pending = samples;
        } else {
            pending.append(&mut samples);
        }
    }

    /// Takes every pending sample, leaving the buffer empty.
    ///
    /// Each ingested sample is returned by exactly one call.
    pub fn drain_all(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.lock())
    }

    /// Returns the number of pending samples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if there are no pending samples.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sample>> {
        // A panic while holding the lock cannot leave the `Vec` half-updated, so the data is still usable.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
