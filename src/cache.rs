//! The Connection Cache: a bounded, reusable connection pool.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::locality::Locality;
use crate::stats::{Counters, StatisticKind};

/// Outcome of [`ConnectionCache::get_or_reserve`].
pub enum CacheSlot<H> {
	/// An idle connection was reused.
	Existing(Connection<H>),
	/// No idle connection existed, but the cache granted capacity for a new
	/// one. The caller must construct it and eventually [`reclaim`] or
	/// [`clear`](ConnectionCache::clear) the reservation.
	Reserved,
	/// Neither an idle connection nor a free slot is available. The caller
	/// must return without sending; a later `reclaim` elsewhere will
	/// naturally unblock progress.
	Full,
}

struct LocalityState<H> {
	idle: VecDeque<Connection<H>>,
	reserved: usize,
	in_use: usize,
}

impl<H> Default for LocalityState<H> {
	fn default() -> Self {
		Self {
			idle: VecDeque::new(),
			reserved: 0,
			in_use: 0,
		}
	}
}

impl<H> LocalityState<H> {
	fn total(&self) -> usize {
		self.idle.len() + self.reserved + self.in_use
	}

	fn is_empty_state(&self) -> bool {
		self.total() == 0
	}
}

struct Inner<H> {
	localities: HashMap<Locality, LocalityState<H>>,
	/// Global least-recently-reclaimed order: one entry per idle connection,
	/// oldest at the front. Ties are broken by insertion order because
	/// entries are only ever pushed to the back.
	global_lru: VecDeque<Locality>,
	global_count: usize,
	shutdown: bool,
}

impl<H> Default for Inner<H> {
	fn default() -> Self {
		Self {
			localities: HashMap::new(),
			global_lru: VecDeque::new(),
			global_count: 0,
			shutdown: false,
		}
	}
}

/// Bounded pool of reusable outbound connections keyed by destination
/// locality.
///
/// Invariant: `sum(idle) + sum(reserved) + sum(in_use) <= max_connections`,
/// and per locality `idle + reserved + in_use <= max_connections_per_locality`.
pub struct ConnectionCache<H> {
	inner: Mutex<Inner<H>>,
	max_connections: usize,
	max_connections_per_locality: usize,
	stats: Counters,
}

impl<H> ConnectionCache<H> {
	/// Construct a cache with the given global and per-locality capacities.
	pub fn new(max_connections: usize, max_connections_per_locality: usize) -> Self {
		Self {
			inner: Mutex::new(Inner::default()),
			max_connections,
			max_connections_per_locality,
			stats: Counters::default(),
		}
	}

	/// Evict one idle connection belonging to `locality`, if any. Returns
	/// whether an eviction happened.
	fn evict_one_from_locality(inner: &mut Inner<H>, locality: &Locality) -> bool {
		if let Some(state) = inner.localities.get_mut(locality) {
			if state.idle.pop_front().is_some() {
				inner.global_count -= 1;
				if let Some(pos) = inner.global_lru.iter().position(|l| l == locality) {
					inner.global_lru.remove(pos);
				}
				return true;
			}
		}
		false
	}

	/// Evict the globally least-recently-reclaimed idle connection from any
	/// locality. Returns whether an eviction happened.
	fn evict_global_lru(inner: &mut Inner<H>) -> bool {
		while let Some(locality) = inner.global_lru.pop_front() {
			if let Some(state) = inner.localities.get_mut(&locality) {
				if state.idle.pop_front().is_some() {
					inner.global_count -= 1;
					return true;
				}
			}
		}
		false
	}

	/// Get an idle connection for `locality`, or a reservation to build one,
	/// or `Full` if the cache has no capacity to spare.
	pub fn get_or_reserve(&self, locality: &Locality) -> CacheSlot<H> {
		let mut inner = self.inner.lock();
		if inner.shutdown {
			return CacheSlot::Full;
		}

		if let Some(state) = inner.localities.get_mut(locality) {
			if let Some(connection) = state.idle.pop_front() {
				state.in_use += 1;
				if let Some(pos) = inner.global_lru.iter().position(|l| l == locality) {
					inner.global_lru.remove(pos);
				}
				self.stats.increment(StatisticKind::Hits);
				return CacheSlot::Existing(connection);
			}
		}
		self.stats.increment(StatisticKind::Misses);

		// Per-locality capacity: evict this locality's own idle connection
		// if it is the one over budget; reserved/in-use connections are
		// never evicted out from under their holder.
		let locality_total = inner.localities.get(locality).map(LocalityState::total).unwrap_or(0);
		if locality_total >= self.max_connections_per_locality {
			if !Self::evict_one_from_locality(&mut inner, locality) {
				return CacheSlot::Full;
			}
			self.stats.increment(StatisticKind::Evictions);
		}

		// Global capacity: evict the least-recently-reclaimed idle
		// connection from anywhere.
		if inner.global_count >= self.max_connections {
			if !Self::evict_global_lru(&mut inner) {
				return CacheSlot::Full;
			}
			self.stats.increment(StatisticKind::Evictions);
		}

		let state = inner.localities.entry(locality.clone()).or_default();
		state.reserved += 1;
		inner.global_count += 1;
		CacheSlot::Reserved
	}

	/// Return a healthy connection to the idle pool.
	pub fn reclaim(&self, locality: &Locality, connection: Connection<H>) {
		let mut inner = self.inner.lock();
		if inner.shutdown {
			// Nothing left to reclaim into; drop the connection and free
			// whatever slot it was holding.
			if let Some(state) = inner.localities.get_mut(locality) {
				if state.in_use > 0 {
					state.in_use -= 1;
				} else if state.reserved > 0 {
					state.reserved -= 1;
				}
				inner.global_count = inner.global_count.saturating_sub(1);
			}
			return;
		}
		let state = inner.localities.entry(locality.clone()).or_default();
		if state.in_use > 0 {
			state.in_use -= 1;
		} else if state.reserved > 0 {
			state.reserved -= 1;
		}
		state.idle.push_back(connection);
		inner.global_lru.push_back(locality.clone());
		self.stats.increment(StatisticKind::Reclaims);
	}

	/// Discard a specific failed connection, decrementing counts and
	/// freeing its slot without returning it to the idle pool.
	pub fn clear_connection(&self, locality: &Locality, _connection: Connection<H>) {
		let mut inner = self.inner.lock();
		let is_empty = if let Some(state) = inner.localities.get_mut(locality) {
			if state.in_use > 0 {
				state.in_use -= 1;
			} else if state.reserved > 0 {
				state.reserved -= 1;
			}
			Some(state.is_empty_state())
		} else {
			None
		};
		if let Some(is_empty) = is_empty {
			inner.global_count = inner.global_count.saturating_sub(1);
			if is_empty {
				inner.localities.remove(locality);
			}
		}
	}

	/// Discard a reservation that will never be filled (e.g. connection
	/// creation failed).
	pub fn release_reservation(&self, locality: &Locality) {
		let mut inner = self.inner.lock();
		let result = if let Some(state) = inner.localities.get_mut(locality) {
			let decremented = if state.reserved > 0 {
				state.reserved -= 1;
				true
			} else {
				false
			};
			Some((decremented, state.is_empty_state()))
		} else {
			None
		};
		if let Some((decremented, is_empty)) = result {
			if decremented {
				inner.global_count = inner.global_count.saturating_sub(1);
			}
			if is_empty {
				inner.localities.remove(locality);
			}
		}
	}

	/// Evict every idle connection for `locality` (used after peer churn).
	pub fn clear_locality(&self, locality: &Locality) {
		let mut inner = self.inner.lock();
		if let Some(state) = inner.localities.get_mut(locality) {
			let evicted = state.idle.len();
			state.idle.clear();
			inner.global_count = inner.global_count.saturating_sub(evicted);
			for _ in 0..evicted {
				self.stats.increment(StatisticKind::Evictions);
			}
		}
		inner.global_lru.retain(|l| l != locality);
	}

	/// Evict every idle connection across every locality.
	pub fn clear_all(&self) {
		let mut inner = self.inner.lock();
		let mut evicted = 0;
		for state in inner.localities.values_mut() {
			evicted += state.idle.len();
			state.idle.clear();
		}
		inner.global_count = inner.global_count.saturating_sub(evicted);
		inner.global_lru.clear();
		for _ in 0..evicted {
			self.stats.increment(StatisticKind::Evictions);
		}
	}

	/// Quiesce the cache; subsequent [`get_or_reserve`](Self::get_or_reserve)
	/// calls return [`CacheSlot::Full`].
	pub fn shutdown(&self) {
		let mut inner = self.inner.lock();
		inner.shutdown = true;
		inner.localities.clear();
		inner.global_lru.clear();
		inner.global_count = 0;
	}

	/// Read a statistic, optionally resetting it to zero atomically.
	pub fn statistic(&self, kind: StatisticKind, reset: bool) -> i64 {
		self.stats.get(kind, reset)
	}

	/// Total connections (idle + reserved + in-use) currently tracked.
	pub fn total_connections(&self) -> usize {
		self.inner.lock().global_count
	}

	/// Number of idle connections currently held for `locality`.
	pub fn idle_count(&self, locality: &Locality) -> usize {
		self.inner.lock().localities.get(locality).map(|s| s.idle.len()).unwrap_or(0)
	}
}
