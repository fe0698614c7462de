//! The statsd traffic generator.
//!
//! This library supports the `statsd-tg` binary found elsewhere in this
//! project. A run emulates a fixed population of counters, timers, gauges and
//! sets and sprays randomly chosen, randomly valued updates for them at a
//! statsd collector over UDP, from as many threads as configured, until told
//! to stop.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod signals;
pub mod socket;
pub mod telemetry;
pub mod worker;
