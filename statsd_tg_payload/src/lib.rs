//! The statsd-tg payloads
//!
//! This library supports payload generation for the statsd traffic
//! generator: choosing which emulated metric an event belongs to, deriving a
//! kind-appropriate value and encoding the result as a single statsd line.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub use population::Population;
pub use statsd::{Event, Kind, MAX_LINE_BYTES, ParseError, Statsd};

pub mod population;
pub mod statsd;

/// Errors related to payload construction and encoding
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every metric kind was configured with a zero count.
    #[error("Total population must be greater than zero")]
    EmptyPopulation,
    /// Set members are drawn modulo the cardinality, zero is meaningless.
    #[error("Set cardinality must be greater than zero")]
    ZeroSetCardinality,
    /// The encoded line did not fit the line buffer. Indicates a logic defect,
    /// realistic values are far below the bound.
    #[error("Encoded line exceeds {max_bytes} bytes")]
    LineTooLong {
        /// The size of the buffer the line was encoded into
        max_bytes: usize,
    },
}

/// Generate instances of `Self::Output` from a source of randomness.
pub trait Generator {
    /// The type produced by this generator
    type Output;
    /// The error produced by this generator
    type Error;

    /// Generate a new instance of `Self::Output`.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the output cannot be produced
    /// from the configured state.
    fn generate<R>(&self, rng: &mut R) -> Result<Self::Output, Self::Error>
    where
        R: rand::Rng + ?Sized;
}
