//! Translation of OS signals into the shutdown signal.
//!
//! SIGINT and SIGTERM are delivered to a small tokio runtime on a dedicated
//! thread, never to the workers. When either arrives, or once the configured
//! run duration elapses, the [`Broadcaster`] is signaled and the workers wind
//! down on their next loop check.

use std::{fmt, io, thread, time::Duration};

use statsd_tg_signal::Broadcaster;
use tokio::runtime::Builder;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::info;

/// Errors produced by [`install`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The signal runtime or its handlers could not be set up
    #[error("Failed to install signal handlers: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why the shutdown signal was raised.
pub enum Reason {
    /// SIGINT, usually ctrl-c
    Interrupt,
    /// SIGTERM
    Terminate,
    /// The configured run duration elapsed
    Elapsed,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Interrupt => f.write_str("received interrupt"),
            Reason::Terminate => f.write_str("received terminate"),
            Reason::Elapsed => f.write_str("run duration elapsed"),
        }
    }
}

#[derive(Debug)]
struct Listener {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl Listener {
    /// Register the handlers. Must be called from within a runtime.
    fn new() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            interrupt: signal(SignalKind::interrupt())?,
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(unix)]
    async fn wait(mut self, duration: Option<Duration>) -> Reason {
        tokio::select! {
            _ = self.interrupt.recv() => Reason::Interrupt,
            _ = self.terminate.recv() => Reason::Terminate,
            () = elapsed(duration) => Reason::Elapsed,
        }
    }

    #[cfg(not(unix))]
    async fn wait(self, duration: Option<Duration>) -> Reason {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => Reason::Interrupt,
            () = elapsed(duration) => Reason::Elapsed,
        }
    }
}

async fn elapsed(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Install the signal listener, returning the handle of its thread.
///
/// Handlers are registered before this function returns, a signal arriving
/// afterward is never lost. The thread exits once it has signaled
/// `broadcaster`.
///
/// # Errors
///
/// Function will return an error if the runtime cannot be built, the
/// handlers cannot be registered or the thread cannot be spawned.
pub fn install(
    broadcaster: Broadcaster,
    duration: Option<Duration>,
) -> Result<thread::JoinHandle<Reason>, Error> {
    let runtime = Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let listener = runtime.block_on(async { Listener::new() })?;

    let handle = thread::Builder::new()
        .name("statsd-tg-signals".to_string())
        .spawn(move || {
            let reason = runtime.block_on(listener.wait(duration));
            info!("{reason}, signaling shutdown");
            broadcaster.signal();
            reason
        })?;
    Ok(handle)
}
