//! Typed statistics selector.

use std::sync::atomic::{AtomicI64, Ordering};

/// Selects which connection-cache counter to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatisticKind {
	/// Number of connections inserted into the cache.
	Insertions,
	/// Number of connections evicted to make room for another.
	Evictions,
	/// Number of `get_or_reserve` calls satisfied by an idle connection.
	Hits,
	/// Number of `get_or_reserve` calls that found no idle connection.
	Misses,
	/// Number of connections returned to the idle pool via `reclaim`.
	Reclaims,
}

/// Five atomic counters, one per [`StatisticKind`].
#[derive(Debug, Default)]
pub struct Counters {
	insertions: AtomicI64,
	evictions: AtomicI64,
	hits: AtomicI64,
	misses: AtomicI64,
	reclaims: AtomicI64,
}

impl Counters {
	fn counter(&self, kind: StatisticKind) -> &AtomicI64 {
		match kind {
			StatisticKind::Insertions => &self.insertions,
			StatisticKind::Evictions => &self.evictions,
			StatisticKind::Hits => &self.hits,
			StatisticKind::Misses => &self.misses,
			StatisticKind::Reclaims => &self.reclaims,
		}
	}

	/// Increment the named counter by one.
	#[inline]
	pub fn increment(&self, kind: StatisticKind) {
		self.counter(kind).fetch_add(1, Ordering::Relaxed);
	}

	/// Read the named counter, optionally resetting it atomically to zero.
	pub fn get(&self, kind: StatisticKind, reset: bool) -> i64 {
		let counter = self.counter(kind);
		if reset {
			counter.swap(0, Ordering::Relaxed)
		} else {
			counter.load(Ordering::Relaxed)
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn increments_and_reads_independently() {
		let counters = Counters::default();
		counters.increment(StatisticKind::Hits);
		counters.increment(StatisticKind::Hits);
		counters.increment(StatisticKind::Misses);

		assert_eq!(counters.get(StatisticKind::Hits, false), 2);
		assert_eq!(counters.get(StatisticKind::Misses, false), 1);
		assert_eq!(counters.get(StatisticKind::Evictions, false), 0);
	}

	#[test]
	fn reset_on_read_zeroes_the_counter() {
		let counters = Counters::default();
		counters.increment(StatisticKind::Reclaims);
		assert_eq!(counters.get(StatisticKind::Reclaims, true), 1);
		assert_eq!(counters.get(StatisticKind::Reclaims, false), 0);
	}
}
