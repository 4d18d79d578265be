//! Untyped error handling shared by the Tally crates.
//!
//! Library code with a small, closed set of failure modes uses `snafu`-derived error enums. Everything that only needs
//! to be reported (bootstrap, configuration glue, the binary) uses [`GenericError`].
#![deny(missing_docs)]

use std::fmt::Display;

/// An opaque error carrying a chain of causes.
pub type GenericError = anyhow::Error;

/// Constructs a [`GenericError`].
///
/// Accepts a string literal, a format string followed by its arguments (as with `std::format!`), or any value that
/// implements both `Debug` and `Display`. When given an existing `std::error::Error`, its source chain is preserved.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

/// Extension methods for attaching context to fallible results.
///
/// This is a thin wrapper over `anyhow::Context` whose method names do not collide with `snafu::ResultExt`, so both
/// traits can be imported in the same module.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wraps the error, if any, with the given context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wraps the error, if any, with context produced by `f`. `f` is only called on the error path.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, f)
    }
}
