//! The emulated metric population.
//!
//! A [`Population`] is the fixed set of counters, timers, gauges and sets the
//! generator pretends to be. Every event belongs to one member of the
//! population, identified by a draw in `[0, total)`. The draw range is carved
//! into four contiguous sub-ranges -- counters first, then timers, gauges and
//! sets -- each as long as its kind's configured count.

use std::num::{NonZeroU32, NonZeroU64};

use crate::{Error, statsd::Kind};

/// Default number of emulated counters
pub const DEFAULT_COUNTERS: u32 = 1000;
/// Default number of emulated timers
pub const DEFAULT_TIMERS: u32 = 1000;
/// Default number of emulated gauges
pub const DEFAULT_GAUGES: u32 = 100;
/// Default number of emulated sets
pub const DEFAULT_SETS: u32 = 100;
/// Default number of distinct members in each set
pub const DEFAULT_SET_CARDINALITY: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The population of metrics emulated by the generator.
///
/// Immutable once built. Construction guarantees a non-zero total so that
/// reducing a draw modulo the total is always defined.
pub struct Population {
    counters: u32,
    timers: u32,
    gauges: u32,
    sets: u32,
    set_cardinality: NonZeroU32,
    total: NonZeroU64,
}

impl Default for Population {
    fn default() -> Self {
        Self::new(
            DEFAULT_COUNTERS,
            DEFAULT_TIMERS,
            DEFAULT_GAUGES,
            DEFAULT_SETS,
            DEFAULT_SET_CARDINALITY,
        )
        .expect("default population must be valid")
    }
}

impl Population {
    /// Create a new [`Population`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPopulation`] if every count is zero and
    /// [`Error::ZeroSetCardinality`] if `set_cardinality` is zero.
    pub fn new(
        counters: u32,
        timers: u32,
        gauges: u32,
        sets: u32,
        set_cardinality: u32,
    ) -> Result<Self, Error> {
        let set_cardinality = NonZeroU32::new(set_cardinality).ok_or(Error::ZeroSetCardinality)?;
        let total = u64::from(counters) + u64::from(timers) + u64::from(gauges) + u64::from(sets);
        let total = NonZeroU64::new(total).ok_or(Error::EmptyPopulation)?;

        Ok(Self {
            counters,
            timers,
            gauges,
            sets,
            set_cardinality,
            total,
        })
    }

    /// Number of emulated counters
    #[must_use]
    pub fn counters(&self) -> u32 {
        self.counters
    }

    /// Number of emulated timers
    #[must_use]
    pub fn timers(&self) -> u32 {
        self.timers
    }

    /// Number of emulated gauges
    #[must_use]
    pub fn gauges(&self) -> u32 {
        self.gauges
    }

    /// Number of emulated sets
    #[must_use]
    pub fn sets(&self) -> u32 {
        self.sets
    }

    /// Modulus applied to set member values
    #[must_use]
    pub fn set_cardinality(&self) -> NonZeroU32 {
        self.set_cardinality
    }

    /// The combined size of the population, never zero.
    #[must_use]
    pub fn total(&self) -> NonZeroU64 {
        self.total
    }

    /// Map a draw `r` in `[0, total)` to the kind of metric it identifies.
    ///
    /// A kind with a zero count owns an empty sub-range and is never
    /// selected. `r` must be below `total`, debug builds panic otherwise.
    #[must_use]
    pub fn select(&self, r: u64) -> Kind {
        debug_assert!(r < self.total.get(), "draw {r} outside population");

        let counters_end = u64::from(self.counters);
        let timers_end = counters_end + u64::from(self.timers);
        let gauges_end = timers_end + u64::from(self.gauges);

        if r < counters_end {
            Kind::Counter
        } else if r < timers_end {
            Kind::Timer
        } else if r < gauges_end {
            Kind::Gauge
        } else {
            Kind::Set
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let population = Population::default();
        let expected = Population::new(1000, 1000, 100, 100, 128).expect("valid population");
        assert_eq!(population, expected);
        assert_eq!(population.total().get(), 2200);
    }

    #[test]
    fn zero_total_is_rejected() {
        assert_eq!(Population::new(0, 0, 0, 0, 128), Err(Error::EmptyPopulation));
    }

    #[test]
    fn zero_set_cardinality_is_rejected() {
        assert_eq!(Population::new(1, 1, 1, 1, 0), Err(Error::ZeroSetCardinality));
    }

    #[test]
    fn boundaries_map_to_their_kind() {
        let population = Population::new(10, 20, 5, 7, 128).expect("valid population");
        assert_eq!(population.select(0), Kind::Counter);
        assert_eq!(population.select(9), Kind::Counter);
        assert_eq!(population.select(10), Kind::Timer);
        assert_eq!(population.select(29), Kind::Timer);
        assert_eq!(population.select(30), Kind::Gauge);
        assert_eq!(population.select(34), Kind::Gauge);
        assert_eq!(population.select(35), Kind::Set);
        assert_eq!(population.select(41), Kind::Set);
    }

    #[test]
    fn empty_kinds_are_never_selected() {
        let population = Population::new(3, 0, 0, 1, 10).expect("valid population");
        assert_eq!(population.select(0), Kind::Counter);
        assert_eq!(population.select(1), Kind::Counter);
        assert_eq!(population.select(2), Kind::Counter);
        assert_eq!(population.select(3), Kind::Set);
    }

    #[test]
    fn huge_counts_do_not_overflow() {
        let population =
            Population::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX, 1).expect("valid population");
        assert_eq!(population.total().get(), 4 * u64::from(u32::MAX));
        assert_eq!(population.select(population.total().get() - 1), Kind::Set);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside population")]
    fn draw_at_total_is_outside_population() {
        let population = Population::new(3, 0, 0, 1, 10).expect("valid population");
        let _ = population.select(population.total().get());
    }

    // Every draw selects exactly one kind and the sub-ranges have exactly the
    // configured lengths: no gaps, no overlaps.
    proptest! {
        #[test]
        fn sub_ranges_partition_the_draw_space(
            counters in 0u32..64,
            timers in 0u32..64,
            gauges in 0u32..64,
            sets in 0u32..64,
        ) {
            prop_assume!(counters + timers + gauges + sets > 0);
            let population = Population::new(counters, timers, gauges, sets, 128)
                .expect("valid population");

            let mut seen = [0u32; 4];
            let mut previous = Kind::Counter;
            for r in 0..population.total().get() {
                let kind = population.select(r);
                // Sub-ranges come in fixed order, a kind never reappears.
                prop_assert!(kind >= previous);
                previous = kind;
                seen[kind as usize] += 1;
            }
            prop_assert_eq!(seen, [counters, timers, gauges, sets]);
        }
    }
}
