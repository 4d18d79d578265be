//! Process bootstrap helpers for Tally binaries.
#![deny(missing_docs)]

pub mod logging;

/// Commonly used bootstrap items.
pub mod prelude {
    pub use super::logging::{fatal_and_exit, initialize_logging, LoggingConfiguration};
}
