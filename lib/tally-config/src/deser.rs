//! Permissive deserialization helpers, for use with `serde_with`.
//!
//! Values arriving through environment variables are always strings, while the same values in a YAML file are usually
//! native types. These helpers accept both spellings.

use std::{fmt, time::Duration};

use serde::{
    de::{Error, SeqAccess, Unexpected},
    Deserializer,
};
use serde_with::DeserializeAs;

/// Permissively deserializes a boolean.
///
/// Accepts:
///
/// - `true` or `false` as a native boolean
/// - `"true"`, `"false"`, `"1"` or `"0"` as a string (case insensitive)
/// - `1` or `0` as an integer
pub struct PermissiveBool;

impl<'de> DeserializeAs<'de, bool> for PermissiveBool {
    fn deserialize_as<D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> serde::de::Visitor<'vde> for Visitor {
            type Value = bool;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a boolean, string, or integer")
            }

            fn visit_bool<E: Error>(self, value: bool) -> Result<Self::Value, E> {
                Ok(value)
            }

            fn visit_str<E: Error>(self, value: &str) -> Result<Self::Value, E> {
                match value.trim().to_lowercase().as_str() {
                    "true" | "1" => Ok(true),
                    "false" | "0" => Ok(false),
                    _ => Err(Error::invalid_value(
                        Unexpected::Str(value),
                        &"\"true\" or \"false\" (case insensitive)",
                    )),
                }
            }

            fn visit_i64<E: Error>(self, value: i64) -> Result<Self::Value, E> {
                match value {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(Error::invalid_value(Unexpected::Signed(value), &"0 or 1")),
                }
            }

            fn visit_u64<E: Error>(self, value: u64) -> Result<Self::Value, E> {
                match value {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(Error::invalid_value(Unexpected::Unsigned(value), &"0 or 1")),
                }
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Deserializes a `Duration` from either an integer number of milliseconds or a human-readable string.
///
/// Strings are parsed with `humantime` (`"1s"`, `"250ms"`, `"1m 30s"`). A string holding only digits is treated as
/// milliseconds, matching the integer form.
pub struct DurationMillisOrHuman;

impl<'de> DeserializeAs<'de, Duration> for DurationMillisOrHuman {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> serde::de::Visitor<'vde> for Visitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as integer milliseconds or a string like \"1s\"")
            }

            fn visit_u64<E: Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(Duration::from_millis(value))
            }

            fn visit_i64<E: Error>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(Duration::from_millis)
                    .map_err(|_| Error::invalid_value(Unexpected::Signed(value), &"a non-negative duration"))
            }

            fn visit_str<E: Error>(self, value: &str) -> Result<Self::Value, E> {
                let trimmed = value.trim();
                if let Ok(millis) = trimmed.parse::<u64>() {
                    return Ok(Duration::from_millis(millis));
                }

                humantime::parse_duration(trimmed)
                    .map_err(|_| Error::invalid_value(Unexpected::Str(value), &"a duration like \"1s\" or \"250ms\""))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Deserializes a list of strings from either a sequence or a single comma-separated string.
///
/// Entries are trimmed and empty entries are dropped, so `"vu, iter,"` yields `["vu", "iter"]`.
pub struct OneOrCommaSeparated;

impl<'de> DeserializeAs<'de, Vec<String>> for OneOrCommaSeparated {
    fn deserialize_as<D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> serde::de::Visitor<'vde> for Visitor {
            type Value = Vec<String>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a list of strings or a comma-separated string")
            }

            fn visit_str<E: Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect())
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'vde>,
            {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element::<String>()? {
                    let value = value.trim();
                    if !value.is_empty() {
                        values.push(value.to_string());
                    }
                }
                Ok(values)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
