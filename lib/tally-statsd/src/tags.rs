use std::{collections::HashSet, fmt, sync::Arc};

use crate::sample::Tags;

/// Converts a sample's tags into the list of tags sent on the wire.
///
/// When a collector has no filter, no tags are sent at all. Filters are cheap to clone and shared between threads.
#[derive(Clone)]
pub struct TagFilter {
    inner: Arc<dyn Fn(&Tags) -> Vec<String> + Send + Sync>,
}

impl TagFilter {
    /// Creates a filter from an arbitrary function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Tags) -> Vec<String> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Creates a filter that sends every tag, rendered as `key:value`.
    pub fn all() -> Self {
        Self::new(|tags| tags.iter().map(|(k, v)| render_tag(k, v)).collect())
    }

    /// Creates a filter that sends every tag except those whose key is in `keys`, rendered as `key:value`.
    pub fn blacklist<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let blacklist = keys.into_iter().map(Into::into).collect::<HashSet<String>>();
        if blacklist.is_empty() {
            return Self::all();
        }

        Self::new(move |tags| {
            tags.iter()
                .filter(|(k, _)| !blacklist.contains(k.as_str()))
                .map(|(k, v)| render_tag(k, v))
                .collect()
        })
    }

    /// Applies the filter.
    pub fn apply(&self, tags: &Tags) -> Vec<String> {
        (self.inner)(tags)
    }
}

impl fmt::Debug for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagFilter").finish_non_exhaustive()
    }
}

fn render_tag(key: &str, value: &str) -> String {
    format!("{}:{}", key, value)
}
