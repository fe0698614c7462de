//! Shutdown signaling for statsd-tg.
//!
//! Workers spin in a tight loop and must notice, eventually, that the run is
//! over. The mechanism here has two components, a `Broadcaster` and a
//! `Watcher`. The `Broadcaster` flips a level-triggered flag exactly once; every
//! `Watcher` polls that flag on each loop iteration without blocking. There is
//! one `Broadcaster` and potentially many `Watcher` instances.
//!
//! No ordering is promised between the flag being raised and any particular
//! watcher observing it beyond eventual visibility: a worker may complete
//! zero or more iterations after the signal is sent. Synchronization of the
//! work done before shutdown is the job of whoever joins the watchers' threads.

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

#[cfg(not(loom))]
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[cfg(loom)]
use loom::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::info;

/// Construct a `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    let raised = Arc::new(AtomicBool::new(false));

    let w = Watcher {
        raised: Arc::clone(&raised),
        signal_received: false,
    };
    let b = Broadcaster { raised };

    (w, b)
}

#[derive(Debug)]
/// Mechanism to notify one or more `Watcher` instances that the run is over.
pub struct Broadcaster {
    /// The flag shared with every `Watcher` derived from the same pair.
    raised: Arc<AtomicBool>,
}

impl Broadcaster {
    /// Raise the signal for every `Watcher`.
    ///
    /// Function will NOT block until watchers have observed the signal.
    pub fn signal(self) {
        info!("raising shutdown signal");
        self.raised.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
/// Mechanism to watch for shutdown, polled from a worker's hot loop.
pub struct Watcher {
    /// The flag raised by `Broadcaster::signal`.
    raised: Arc<AtomicBool>,
    /// Once the signal is observed it is remembered without touching the
    /// shared flag again.
    signal_received: bool,
}

impl Watcher {
    /// Check if the shutdown signal has been raised without blocking.
    ///
    /// Once this returns `true` every later call also returns `true`.
    #[inline]
    pub fn try_recv(&mut self) -> bool {
        if self.signal_received {
            return true;
        }
        if self.raised.load(Ordering::Acquire) {
            self.signal_received = true;
        }
        self.signal_received
    }
}

impl Clone for Watcher {
    fn clone(&self) -> Self {
        Self {
            raised: Arc::clone(&self.raised),
            // A fresh watcher observes the shared flag for itself.
            signal_received: false,
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(not(loom))]
    #[test]
    fn try_receive_before_and_after_signal() {
        use crate::signal;

        let (mut watcher, broadcaster) = signal();
        assert!(!watcher.try_recv());
        broadcaster.signal();
        assert!(watcher.try_recv());
        // Level-triggered: the signal stays observed.
        assert!(watcher.try_recv());
    }

    #[cfg(not(loom))]
    #[test]
    fn clones_observe_the_same_signal() {
        use crate::signal;

        let (mut watcher1, broadcaster) = signal();
        let mut watcher2 = watcher1.clone();
        assert!(!watcher1.try_recv());
        assert!(!watcher2.try_recv());

        broadcaster.signal();

        assert!(watcher1.try_recv());
        assert!(watcher2.try_recv());
        // A clone taken after the signal sees it too.
        let mut watcher3 = watcher1.clone();
        assert!(watcher3.try_recv());
    }

    #[cfg(not(loom))]
    #[test]
    fn watcher_threads_exit_after_signal() {
        use std::thread;

        use crate::signal;

        let (watcher, broadcaster) = signal();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mut watcher = watcher.clone();
                thread::spawn(move || {
                    let mut spins: u64 = 0;
                    while !watcher.try_recv() {
                        spins += 1;
                        thread::yield_now();
                    }
                    spins
                })
            })
            .collect();

        broadcaster.signal();
        for handle in handles {
            handle.join().expect("watcher thread panicked");
        }
    }

    #[cfg(loom)]
    #[test]
    fn basic_signal() {
        use loom::thread;

        use crate::signal;

        loom::model(|| {
            let (mut watcher, broadcaster) = signal();

            let watcher_handle = thread::spawn(move || {
                while !watcher.try_recv() {
                    thread::yield_now();
                }
            });

            broadcaster.signal();
            watcher_handle.join().unwrap();
        });
    }

    #[cfg(loom)]
    #[test]
    fn multiple_watchers() {
        use loom::thread;

        use crate::signal;

        loom::model(|| {
            let (mut watcher1, broadcaster) = signal();
            let mut watcher2 = watcher1.clone();

            let watcher_handle1 = thread::spawn(move || {
                while !watcher1.try_recv() {
                    thread::yield_now();
                }
            });
            let watcher_handle2 = thread::spawn(move || {
                while !watcher2.try_recv() {
                    thread::yield_now();
                }
            });

            broadcaster.signal();
            watcher_handle1.join().unwrap();
            watcher_handle2.join().unwrap();
        });
    }

    #[cfg(loom)]
    #[test]
    fn work_before_signal_is_visible_after_observation() {
        use loom::{
            sync::{
                Arc,
                atomic::{AtomicU64, Ordering},
            },
            thread,
        };

        use crate::signal;

        loom::model(|| {
            let (mut watcher, broadcaster) = signal();
            let tally = Arc::new(AtomicU64::new(0));
            let producer_tally = Arc::clone(&tally);

            let producer = thread::spawn(move || {
                producer_tally.store(7, Ordering::Relaxed);
                broadcaster.signal();
            });

            while !watcher.try_recv() {
                thread::yield_now();
            }
            assert_eq!(tally.load(Ordering::Relaxed), 7);
            producer.join().unwrap();
        });
    }
}
