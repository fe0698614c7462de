//! Process-wide send accounting.
//!
//! Workers never touch shared state on their hot path. Each keeps a local
//! [`Tally`] and folds it into the [`Aggregator`] exactly once, when its loop
//! exits. The lock is therefore taken once per worker per run.

use std::{
    ops::AddAssign,
    sync::{Mutex, PoisonError},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Counts accumulated by a single worker, or by all of them.
pub struct Tally {
    /// Events handed to the transport successfully
    pub events: u64,
    /// Bytes handed to the transport successfully
    pub bytes: u64,
    /// Sends the transport refused
    pub send_failures: u64,
    /// Events dropped because their line did not fit the buffer
    pub encode_failures: u64,
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.events += rhs.events;
        self.bytes += rhs.bytes;
        self.send_failures += rhs.send_failures;
        self.encode_failures += rhs.encode_failures;
    }
}

#[derive(Debug, Default)]
struct Totals {
    tally: Tally,
    workers: usize,
}

#[derive(Debug, Default)]
/// The shared tally every worker reports into.
pub struct Aggregator {
    totals: Mutex<Totals>,
}

impl Aggregator {
    /// Fold one worker's final tally into the total.
    pub fn fold(&self, tally: Tally) {
        // A panicking worker never reaches its fold, the totals stay
        // consistent even if the lock is poisoned.
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.tally += tally;
        totals.workers += 1;
    }

    /// The sum of every tally folded so far.
    #[must_use]
    pub fn total(&self) -> Tally {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tally
    }

    /// The number of workers that have reported.
    #[must_use]
    pub fn workers_reported(&self) -> usize {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .workers
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn empty_aggregator_is_zero() {
        let aggregator = Aggregator::default();
        assert_eq!(aggregator.total(), Tally::default());
        assert_eq!(aggregator.workers_reported(), 0);
    }

    #[test]
    fn concurrent_folds_are_not_lost() {
        let aggregator = Arc::new(Aggregator::default());
        let handles: Vec<_> = (0..16u64)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    aggregator.fold(Tally {
                        events: i,
                        bytes: 10 * i,
                        send_failures: 1,
                        encode_failures: 0,
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("folding thread panicked");
        }

        let total = aggregator.total();
        assert_eq!(total.events, (0..16).sum::<u64>());
        assert_eq!(total.bytes, 10 * (0..16).sum::<u64>());
        assert_eq!(total.send_failures, 16);
        assert_eq!(aggregator.workers_reported(), 16);
    }
}
