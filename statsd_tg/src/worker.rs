//! The statsd speaking worker.
//!
//! A worker owns one transport and one random generator and sends events as
//! fast as the transport accepts them until the shutdown signal is observed.
//! Nothing on the hot path is shared with other workers.
//!
//! ## Metrics
//!
//! `events_sent`: Events written successfully
//! `bytes_written`: Bytes written successfully
//! `request_failure`: Number of failed writes; the event is dropped
//! `encode_failure`: Number of events dropped because they did not encode
//!

use std::{
    io,
    net::UdpSocket,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use metrics::counter;
use rand::{SeedableRng, rngs::SmallRng};
use statsd_tg_payload::{Generator, MAX_LINE_BYTES, Statsd};
use statsd_tg_signal::Watcher;
use tracing::{debug, error, info, warn};

use crate::{
    aggregator::{Aggregator, Tally},
    socket,
};

/// Odd 64-bit constant, multiplying by it is a bijection on `u64`.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Errors produced by [`Worker`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The worker's socket could not be opened
    #[error("Worker {id} could not open its socket: {source}")]
    Socket {
        /// Worker identity
        id: usize,
        /// Underlying socket error
        #[source]
        source: socket::Error,
    },
}

/// A connectionless, best-effort datagram sink.
pub trait Transport {
    /// Send `buf` as a single datagram, returning the number of bytes sent.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when the datagram could not be sent.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl Transport for UdpSocket {
    #[inline]
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, buf)
    }
}

/// Derive the seed of worker `id`.
///
/// Seeds are taken from the wall clock unless `pinned` is given. Either way
/// the worker identity is mixed in, distinct workers never share a stream.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn seed(id: usize, pinned: Option<u64>) -> u64 {
    let base = pinned.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_nanos() as u64)
    });
    base ^ (id as u64).wrapping_add(1).wrapping_mul(SEED_MIX)
}

#[derive(Debug)]
/// The worker.
///
/// This worker is responsible for generating statsd lines and sending them
/// to the destination via its own transport.
pub struct Worker<T = UdpSocket> {
    id: usize,
    transport: T,
    rng: SmallRng,
    statsd: Statsd,
    shutdown: Watcher,
    aggregator: Arc<Aggregator>,
    line_capacity: usize,
    metric_labels: Vec<(String, String)>,
}

impl Worker<UdpSocket> {
    /// Create a new [`Worker`] with its own socket connected to `host` and
    /// `service`, a port number or service name.
    ///
    /// # Errors
    ///
    /// Function will return an error if the destination cannot be resolved
    /// or connected.
    pub fn connect(
        id: usize,
        host: &str,
        service: &str,
        statsd: Statsd,
        seed: u64,
        shutdown: Watcher,
        aggregator: Arc<Aggregator>,
    ) -> Result<Self, Error> {
        let socket = socket::connect(host, service).map_err(|source| Error::Socket { id, source })?;
        Ok(Self::new(id, socket, statsd, seed, shutdown, aggregator))
    }
}

impl<T> Worker<T>
where
    T: Transport,
{
    /// Create a new [`Worker`] sending through `transport`.
    #[must_use]
    pub fn new(
        id: usize,
        transport: T,
        statsd: Statsd,
        seed: u64,
        shutdown: Watcher,
        aggregator: Arc<Aggregator>,
    ) -> Self {
        let metric_labels = vec![
            ("component".to_string(), "worker".to_string()),
            ("worker".to_string(), id.to_string()),
        ];

        Self {
            id,
            transport,
            rng: SmallRng::seed_from_u64(seed),
            statsd,
            shutdown,
            aggregator,
            line_capacity: MAX_LINE_BYTES,
            metric_labels,
        }
    }

    /// Encode lines into a buffer of `capacity` bytes, at most
    /// [`MAX_LINE_BYTES`]. Events whose line does not fit are dropped and
    /// counted as encode failures.
    #[must_use]
    pub fn with_line_capacity(mut self, capacity: usize) -> Self {
        self.line_capacity = capacity.min(MAX_LINE_BYTES);
        self
    }

    /// The identity of this worker.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Run [`Worker`] until the shutdown signal is observed.
    ///
    /// An iteration in flight when the signal is raised always completes.
    /// Transport and encoding failures are counted and logged, never fatal.
    /// On exit the transport is closed and the worker's tally folded into the
    /// aggregator, exactly once. The folded tally is returned.
    pub fn spin(mut self) -> Tally {
        info!(worker = self.id, "worker running");

        let events_sent = counter!("events_sent", &self.metric_labels);
        let bytes_written = counter!("bytes_written", &self.metric_labels);
        let request_failure = counter!("request_failure", &self.metric_labels);
        let encode_failure = counter!("encode_failure", &self.metric_labels);

        let mut tally = Tally::default();
        let mut buf = vec![0u8; self.line_capacity];

        while !self.shutdown.try_recv() {
            let event = match self.statsd.generate(&mut self.rng) {
                Ok(event) => event,
                Err(err) => {
                    error!(worker = self.id, "event generation failed: {err}");
                    continue;
                }
            };
            let len = match event.encode(&mut buf) {
                Ok(len) => len,
                Err(err) => {
                    error!(worker = self.id, "dropping {event:?}: {err}");
                    tally.encode_failures += 1;
                    encode_failure.increment(1);
                    continue;
                }
            };

            // A short send is accepted as environmental loss.
            match self.transport.send(&buf[..len]) {
                Ok(bytes) => {
                    tally.events += 1;
                    tally.bytes += bytes as u64;
                    events_sent.increment(1);
                    bytes_written.increment(bytes as u64);
                }
                Err(err) => {
                    tally.send_failures += 1;
                    request_failure.increment(1);
                    if tally.send_failures == 1 {
                        warn!(worker = self.id, "send failed: {err}");
                    } else {
                        debug!(worker = self.id, "send failed: {err}");
                    }
                }
            }
        }

        drop(self.transport);
        self.aggregator.fold(tally);
        info!(
            worker = self.id,
            events = tally.events,
            send_failures = tally.send_failures,
            "shutdown signal received"
        );
        tally
    }
}
