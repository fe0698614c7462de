//! The run coordinator.
//!
//! The coordinator opens one socket per worker, starts every worker on its
//! own OS thread and blocks until all of them have observed the shutdown
//! signal and folded their tallies. Joining the worker threads is what
//! orders every fold before the final read of the aggregate.

use std::{
    fmt, io,
    num::NonZeroUsize,
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use metrics::gauge;
use statsd_tg_payload::Statsd;
use statsd_tg_signal::Watcher;
use tracing::{error, info};

use crate::{
    aggregator::{Aggregator, Tally},
    config::{self, Config},
    worker::{self, Transport, Worker},
};

/// Elapsed time is clamped to at least this many seconds when computing a
/// rate.
pub const MIN_ELAPSED_SECONDS: f64 = 1e-6;

/// Errors produced by [`Coordinator`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// See [`crate::config::Error`] for details.
    #[error(transparent)]
    Config(#[from] config::Error),
    /// See [`crate::worker::Error`] for details.
    #[error(transparent)]
    Worker(#[from] worker::Error),
    /// A worker thread could not be spawned. Workers already spawned were
    /// stopped before sending anything.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
    /// One or more worker threads panicked
    #[error("{count} worker thread(s) panicked")]
    WorkerPanic {
        /// Number of panicked workers
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Aggregate outcome of a run.
pub struct Report {
    /// Events sent across every worker
    pub events: u64,
    /// Bytes sent across every worker
    pub bytes: u64,
    /// Sends refused by the transport across every worker
    pub send_failures: u64,
    /// Time between starting the first worker and joining the last
    pub elapsed: Duration,
}

impl Report {
    /// Build a report from the aggregate tally and the run's duration.
    #[must_use]
    pub fn new(tally: Tally, elapsed: Duration) -> Self {
        Self {
            events: tally.events,
            bytes: tally.bytes,
            send_failures: tally.send_failures,
            elapsed,
        }
    }

    /// Events per second over the whole run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        self.events as f64 / self.elapsed.as_secs_f64().max(MIN_ELAPSED_SECONDS)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent {} events in {:.3}s ({:.1} events/s).",
            self.events,
            self.elapsed.as_secs_f64(),
            self.rate()
        )
    }
}

#[derive(Debug)]
/// The coordinator of a single run.
pub struct Coordinator {
    statsd: Statsd,
    threads: NonZeroUsize,
    host: String,
    port: String,
    seed: Option<u64>,
}

impl Coordinator {
    /// Create a new [`Coordinator`] from a configuration.
    ///
    /// # Errors
    ///
    /// Function will return an error if the configuration does not validate.
    /// Nothing is opened or started in that case.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let population = config.population()?;
        let threads = config.threads()?;

        Ok(Self {
            statsd: Statsd::new(population),
            threads,
            host: config.host.clone(),
            port: config.port.clone(),
            seed: config.seed,
        })
    }

    /// The number of workers this coordinator starts.
    #[must_use]
    pub fn threads(&self) -> NonZeroUsize {
        self.threads
    }

    /// Run every worker to completion and report the aggregate.
    ///
    /// Workers stop once `shutdown` is signaled. This function blocks until
    /// all of them have exited.
    ///
    /// # Errors
    ///
    /// Function will return an error if any worker's socket cannot be opened
    /// or any worker thread cannot be spawned, in which case no worker sends
    /// anything and no thread is left behind. It will also return an error if
    /// a worker thread panics.
    #[allow(clippy::cast_precision_loss)]
    pub fn run(self, shutdown: Watcher) -> Result<Report, Error> {
        let threads = self.threads.get();
        info!(
            "Starting {threads} workers against {host}:{port}",
            host = self.host,
            port = self.port
        );
        gauge!("workers").set(threads as f64);
        gauge!("population_total").set(self.statsd.population().total().get() as f64);

        let aggregator = Arc::new(Aggregator::default());

        // Every worker opens its own socket before any of them sends, a bad
        // destination fails the run up front.
        let workers = (0..threads)
            .map(|id| {
                Worker::connect(
                    id,
                    &self.host,
                    &self.port,
                    self.statsd,
                    worker::seed(id, self.seed),
                    shutdown.clone(),
                    Arc::clone(&aggregator),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(shutdown);

        let start = Instant::now();
        let handles = launch(workers, |name, body| {
            thread::Builder::new().name(name).spawn(body)
        })?;

        let mut panicked = 0;
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
                panicked += 1;
            }
        }
        let elapsed = start.elapsed();

        if panicked > 0 {
            return Err(Error::WorkerPanic { count: panicked });
        }

        let report = Report::new(aggregator.total(), elapsed);
        info!(
            events = report.events,
            bytes = report.bytes,
            send_failures = report.send_failures,
            workers = aggregator.workers_reported(),
            "all workers joined"
        );
        Ok(report)
    }
}

type WorkerBody = Box<dyn FnOnce() -> Option<Tally> + Send>;

/// Spawn every worker parked behind a gate, then open all gates at once.
///
/// If any spawn fails the gates are dropped instead. Parked workers then exit
/// without sending and are joined before the error is returned.
fn launch<T, S>(workers: Vec<Worker<T>>, mut spawn: S) -> Result<Vec<JoinHandle<Option<Tally>>>, Error>
where
    T: Transport + Send + 'static,
    S: FnMut(String, WorkerBody) -> io::Result<JoinHandle<Option<Tally>>>,
{
    let mut gates = Vec::with_capacity(workers.len());
    let mut handles = Vec::with_capacity(workers.len());

    for worker in workers {
        let (gate, parked) = mpsc::sync_channel::<()>(1);
        let name = format!("statsd-tg-worker-{}", worker.id());
        let body: WorkerBody = Box::new(move || parked.recv().ok().map(|()| worker.spin()));
        match spawn(name, body) {
            Ok(handle) => {
                gates.push(gate);
                handles.push(handle);
            }
            Err(err) => {
                error!("failed to spawn worker thread, stopping parked workers: {err}");
                drop(gates);
                for handle in handles {
                    if handle.join().is_err() {
                        error!("parked worker thread panicked");
                    }
                }
                return Err(Error::Spawn(err));
            }
        }
    }

    for gate in gates {
        // Only a panicked worker drops its end, the join reports that.
        let _ = gate.send(());
    }
    Ok(handles)
}
