//! Statsd metric lines.
//!
//! Each event is rendered as `<index>:<value>|<suffix>` where the index is a
//! zero-padded, six digit decimal and the suffix names the metric kind. One
//! line is one datagram, no trailing newline is written.

use std::{
    fmt,
    io::{self, Write},
    num::{NonZeroU32, ParseIntError},
    str::FromStr,
};

use rand::Rng;

use crate::{Error, Generator, population::Population};

/// The size of the buffer a single line is encoded into.
pub const MAX_LINE_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// The kind of an emulated metric. Determines value range and wire suffix.
///
/// Variants are ordered as their sub-ranges appear in a [`Population`].
pub enum Kind {
    /// Monotonic increment, emitted as a small positive delta.
    Counter = 0,
    /// Duration measurement, emitted as a millisecond value.
    Timer = 1,
    /// Instantaneous value, emitted as a signed delta around zero.
    Gauge = 2,
    /// Distinct-member tracking, emitted as a bounded member id.
    Set = 3,
}

impl Kind {
    /// The statsd type suffix of this kind.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Kind::Counter => "c",
            Kind::Timer => "ms",
            Kind::Gauge => "g",
            Kind::Set => "s",
        }
    }

    /// Derive a value for this kind from a raw random draw.
    ///
    /// Counters land in `[1, 8]`, timers in `[1, 1024]`, gauges in
    /// `[-64, 63]` and sets in `[0, set_cardinality)`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn value(self, raw: u64, set_cardinality: NonZeroU32) -> i64 {
        // Every remainder below fits comfortably in an i64.
        match self {
            Kind::Counter => (raw % 8) as i64 + 1,
            Kind::Timer => (raw % 1024) as i64 + 1,
            Kind::Gauge => (raw % 128) as i64 - 64,
            Kind::Set => (raw % u64::from(set_cardinality.get())) as i64,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Kind {
    type Err = ParseError;

    fn from_str(suffix: &str) -> Result<Self, Self::Err> {
        match suffix {
            "c" => Ok(Kind::Counter),
            "ms" => Ok(Kind::Timer),
            "g" => Ok(Kind::Gauge),
            "s" => Ok(Kind::Set),
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A single metric update, produced and consumed within one loop iteration.
pub struct Event {
    /// The draw that selected this metric, doubling as the metric id.
    pub index: u64,
    /// The kind of the metric
    pub kind: Kind,
    /// The kind-appropriate value
    pub value: i64,
}

impl Event {
    /// Encode this event into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] if the line does not fit in `buf`. The
    /// contents of `buf` are unspecified in that case.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let max_bytes = buf.len();
        let mut cursor = io::Cursor::new(buf);
        write!(cursor, "{self}").map_err(|_| Error::LineTooLong { max_bytes })?;
        usize::try_from(cursor.position()).map_err(|_| Error::LineTooLong { max_bytes })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}:{}|{}", self.index, self.value, self.kind)
    }
}

/// Errors produced when parsing a line back into an [`Event`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `:` separates the index from the value
    #[error("missing ':' between index and value")]
    MissingValue,
    /// No `|` separates the value from the kind suffix
    #[error("missing '|' between value and kind")]
    MissingKind,
    /// The index is not an unsigned integer
    #[error("invalid index: {0}")]
    Index(ParseIntError),
    /// The value is not an integer
    #[error("invalid value: {0}")]
    Value(ParseIntError),
    /// The suffix is not one of `c`, `ms`, `g` or `s`
    #[error("unknown metric kind suffix: {0:?}")]
    UnknownKind(String),
}

impl FromStr for Event {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (index, rest) = line.split_once(':').ok_or(ParseError::MissingValue)?;
        let (value, suffix) = rest.split_once('|').ok_or(ParseError::MissingKind)?;

        Ok(Event {
            index: index.parse().map_err(ParseError::Index)?,
            kind: suffix.parse()?,
            value: value.parse().map_err(ParseError::Value)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
/// Generator of random statsd events over a fixed [`Population`].
pub struct Statsd {
    population: Population,
}

impl Statsd {
    /// Create a new [`Statsd`] generator.
    #[must_use]
    pub fn new(population: Population) -> Self {
        Self { population }
    }

    /// The population this generator draws from.
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Build the event identified by draw `r`, valued from `raw`.
    ///
    /// The draw is kept as the metric index as-is, it is not remapped to an
    /// index within its kind.
    #[must_use]
    pub fn event(&self, r: u64, raw: u64) -> Event {
        let kind = self.population.select(r);
        Event {
            index: r,
            kind,
            value: kind.value(raw, self.population.set_cardinality()),
        }
    }
}

impl Generator for Statsd {
    type Output = Event;
    type Error = Error;

    fn generate<R>(&self, rng: &mut R) -> Result<Self::Output, Self::Error>
    where
        R: Rng + ?Sized,
    {
        // Not perfectly fair over the population, good enough for load.
        let r = rng.random::<u64>() % self.population.total().get();
        let raw = rng.random::<u64>();
        Ok(self.event(r, raw))
    }
}
