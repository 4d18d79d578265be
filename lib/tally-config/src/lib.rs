//! Layered configuration for Tally processes.
//!
//! Settings come from an optional file and from prefixed environment variables, merged into a single
//! [`GenericConfiguration`] that components query by key or deserialize into their own typed structs.
#![deny(missing_docs)]

use std::{borrow::Cow, collections::HashSet, path::Path, sync::Arc};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    value::{Dict, Map},
    Figment, Metadata, Profile, Provider,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tally_error::GenericError;
use tracing::debug;

pub mod deser;
mod provider;

use self::provider::FileProvider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// `from_environment` was called with an empty prefix.
    #[snafu(display("Environment prefix cannot be empty."))]
    EmptyPrefix,

    /// A required key has no value in any source.
    #[snafu(display("No value set for '{}'. {}", field, help_text))]
    MissingField {
        /// Suggests the file key and environment variables that would provide the value.
        help_text: String,

        /// Key that was looked up.
        field: Cow<'static, str>,
    },

    /// A key holds a value of the wrong type.
    #[snafu(display("Value for '{}' has the wrong type: expected {}, found {}.", field, expected_ty, actual_ty))]
    InvalidFieldType {
        /// Dotted path of the key.
        field: String,

        /// Type the value was deserialized as.
        expected_ty: String,

        /// Type the value actually has.
        actual_ty: String,
    },

    /// Any other failure, such as an unreadable file.
    #[snafu(display("Failed to load configuration."))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        map_figment_error(&HashSet::new(), e)
    }
}

/// Where else a key may be set, used to build help text for missing keys.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum KeySource {
    /// Environment variables starting with `prefix`, which is uppercase and ends in `_`.
    Environment { prefix: String },
}

impl KeySource {
    fn spelling_of(&self, key: &str) -> String {
        match self {
            Self::Environment { prefix } => format!("{}{}", prefix, key.replace('.', "_").to_uppercase()),
        }
    }
}

struct Layer(Box<dyn Provider + Send + Sync>);

impl Provider for Layer {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        self.0.data()
    }
}

/// Builds a [`GenericConfiguration`] from layered sources.
///
/// Each source overrides the keys of the sources added before it. Available sources are YAML and JSON files,
/// environment variables under a prefix ([`from_environment`][Self::from_environment]) and in-memory values
/// ([`from_serialized`][Self::from_serialized]).
#[derive(Default)]
pub struct ConfigurationLoader {
    key_sources: HashSet<KeySource>,
    layers: Vec<Layer>,
}

impl ConfigurationLoader {
    fn push_layer<P>(mut self, provider: P) -> Self
    where
        P: Provider + Send + Sync + 'static,
    {
        self.layers.push(Layer(Box::new(provider)));
        self
    }

    fn push_file<P>(self, path: P, provider: Result<FileProvider, figment::Error>, kind: &str) -> Self
    where
        P: AsRef<Path>,
    {
        match provider {
            Ok(provider) => self.push_layer(provider),
            Err(e) => {
                debug!(error = %e, path = %path.as_ref().display(), kind, "Skipping unreadable configuration file.");
                self
            }
        }
    }

    /// Adds a YAML file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed, an error is returned.
    pub fn from_yaml<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::from_yaml(&path).map_err(GenericError::from).context(Generic)?;
        Ok(self.push_layer(provider))
    }

    /// Adds a YAML file if it can be read and parsed, and skips it otherwise.
    pub fn try_from_yaml<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::from_yaml(&path);
        self.push_file(path, provider, "yaml")
    }

    /// Adds a JSON file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed, an error is returned.
    pub fn from_json<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::from_json(&path).map_err(GenericError::from).context(Generic)?;
        Ok(self.push_layer(provider))
    }

    /// Adds a JSON file if it can be read and parsed, and skips it otherwise.
    pub fn try_from_json<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::from_json(&path);
        self.push_file(path, provider, "json")
    }

    /// Adds the environment variables starting with `prefix`.
    ///
    /// An underscore is appended to the prefix if it does not already end with one, so a prefix of `tally` matches
    /// every variable starting with `TALLY_`. Matching is case-insensitive and the prefix is stripped from the
    /// resulting keys: `TALLY_STATSD_ADDRESS` becomes `statsd_address`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return EmptyPrefix.fail();
        }

        let mut prefix = prefix.to_uppercase();
        if !prefix.ends_with('_') {
            prefix.push('_');
        }

        // `Env` is not `Send + Sync`, so the variables are read once here.
        let mut values = Env::prefixed(&prefix).data()?;
        let Some(dict) = values.remove(&Profile::Default) else {
            return Ok(self);
        };
        self.key_sources.insert(KeySource::Environment { prefix });
        Ok(self.push_layer(Serialized::defaults(dict)))
    }

    /// Adds in-memory values.
    ///
    /// `values` must serialize as a map; its keys become top-level configuration keys.
    pub fn from_serialized<T>(self, values: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.push_layer(Serialized::defaults(values))
    }

    fn merged(&self) -> Figment {
        self.layers
            .iter()
            .fold(Figment::new(), |figment, layer| figment.admerge(layer))
    }

    /// Merges every source into a [`GenericConfiguration`].
    pub fn into_generic(self) -> GenericConfiguration {
        GenericConfiguration {
            snapshot: Arc::new(Snapshot {
                merged: self.merged(),
                key_sources: self.key_sources,
            }),
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    merged: Figment,
    key_sources: HashSet<KeySource>,
}

/// Merged configuration, queryable by key.
///
/// Keys are dotted paths such as `statsd.address`. A dotted key with no value is retried with the periods replaced by
/// underscores, so `statsd.address` also finds `statsd_address` as set from the environment. Clones share the same
/// snapshot.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    snapshot: Arc<Snapshot>,
}

impl GenericConfiguration {
    fn lookup<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        let merged = &self.snapshot.merged;
        let result = match merged.extract_inner(key) {
            Err(e) if matches!(e.kind, Kind::MissingField(_)) && key.contains('.') => {
                merged.extract_inner(&key.replace('.', "_"))
            }
            other => other,
        };
        result.map_err(|e| map_figment_error(&self.snapshot.key_sources, e))
    }

    /// Returns the value of `key`.
    ///
    /// # Errors
    ///
    /// If `key` has no value, or its value does not match `T`, an error is returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.lookup(key)
    }

    /// Returns the value of `key`, or `None` if it has no value.
    ///
    /// # Errors
    ///
    /// If `key` has a value that does not match `T`, an error is returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.lookup(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deserializes the whole configuration as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration does not match `T`, an error is returned.
    pub fn as_typed<'a, T>(&self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.snapshot
            .merged
            .extract()
            .map_err(|e| map_figment_error(&self.snapshot.key_sources, e))
    }
}

fn map_figment_error(key_sources: &HashSet<KeySource>, e: figment::Error) -> ConfigurationError {
    match e.kind {
        Kind::MissingField(field) => {
            let spellings = std::iter::once(field.to_string())
                .chain(key_sources.iter().map(|source| source.spelling_of(&field)))
                .collect::<Vec<_>>();
            let help_text = format!("Set `{}`.", spellings.join("` or `"));

            ConfigurationError::MissingField { help_text, field }
        }
        Kind::InvalidType(actual, expected_ty) => ConfigurationError::InvalidFieldType {
            field: e.path.join("."),
            expected_ty,
            actual_ty: actual.to_string(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}
