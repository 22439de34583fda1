//! The Pending Queue: per-destination staging area.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::locality::Locality;
use crate::parcel::{Parcel, WriteHandler};

type Batch<P> = (Vec<P>, Vec<WriteHandler<P>>);

struct Inner<P: Parcel> {
	map: HashMap<Locality, Batch<P>>,
	destinations: HashSet<Locality>,
}

impl<P: Parcel> Default for Inner<P> {
	fn default() -> Self {
		Self { map: HashMap::new(), destinations: HashSet::new() }
	}
}

/// Result of [`PendingQueue::dequeue`].
pub enum DequeueOutcome<P: Parcel> {
	/// The destination's entire queued batch was moved out.
	Drained(Vec<P>, Vec<WriteHandler<P>>),
	/// The destination had no queued parcels.
	Empty,
	/// The queue's lock was momentarily contended; try again later.
	Contended,
}

/// Maps [`Locality`] to an ordered pair of parallel sequences of parcels and
/// their handlers, guarded by a single lock.
///
/// Invariants upheld by construction: `parcels.len() == handlers.len()` for
/// every entry; a locality is in the destination set iff its entry is
/// non-empty; `destination_count` equals the destination set's cardinality.
pub struct PendingQueue<P: Parcel> {
	inner: Mutex<Inner<P>>,
	destination_count: AtomicUsize,
}

impl<P: Parcel> Default for PendingQueue<P> {
	fn default() -> Self {
		Self { inner: Mutex::new(Inner::default()), destination_count: AtomicUsize::new(0) }
	}
}

impl<P: Parcel> PendingQueue<P> {
	/// Construct an empty queue.
	pub fn new() -> Self {
		Self::default()
	}

	/// Lock-free fast-path check: does any destination have queued work?
	#[inline]
	pub fn has_pending(&self) -> bool {
		self.destination_count.load(Ordering::Acquire) != 0
	}

	/// Enqueue a single parcel and its handler for `locality`.
	pub fn enqueue(&self, locality: Locality, parcel: P, handler: WriteHandler<P>) {
		let mut inner = self.inner.lock();
		let newly_inserted = !inner.destinations.contains(&locality);
		let entry = inner.map.entry(locality.clone()).or_insert_with(|| (Vec::new(), Vec::new()));
		entry.0.push(parcel);
		entry.1.push(handler);
		if newly_inserted {
			inner.destinations.insert(locality);
			self.destination_count.fetch_add(1, Ordering::AcqRel);
		}
	}

	/// Enqueue a batch of parcels and handlers for `locality`, preserving
	/// submission order, at the *tail* of any already-queued batch.
	pub fn enqueue_batch(&self, locality: Locality, parcels: Vec<P>, handlers: Vec<WriteHandler<P>>) {
		debug_assert_eq!(parcels.len(), handlers.len());
		let mut inner = self.inner.lock();
		let newly_inserted = !inner.destinations.contains(&locality);
		let entry = inner.map.entry(locality.clone()).or_insert_with(|| (Vec::new(), Vec::new()));
		entry.0.extend(parcels);
		entry.1.extend(handlers);
		if newly_inserted {
			inner.destinations.insert(locality);
			self.destination_count.fetch_add(1, Ordering::AcqRel);
		}
	}

	/// Re-insert a previously dequeued (but not fully encoded) batch at the
	/// *head* of `locality`'s queue, preserving intra-batch order.
	///
	/// Parcels that a partial encode left unsent must go out before anything
	/// submitted after them, so they're requeued ahead of newer arrivals
	/// rather than appended behind them.
	pub fn requeue_head(&self, locality: Locality, mut parcels: Vec<P>, mut handlers: Vec<WriteHandler<P>>) {
		if parcels.is_empty() {
			return;
		}
		let mut inner = self.inner.lock();
		let newly_inserted = !inner.destinations.contains(&locality);
		match inner.map.get_mut(&locality) {
			Some((existing_parcels, existing_handlers)) => {
				parcels.append(existing_parcels);
				handlers.append(existing_handlers);
				*existing_parcels = parcels;
				*existing_handlers = handlers;
			}
			None => {
				inner.map.insert(locality.clone(), (parcels, handlers));
			}
		}
		if newly_inserted {
			inner.destinations.insert(locality);
			self.destination_count.fetch_add(1, Ordering::AcqRel);
		}
	}

	/// Attempt to atomically move the entire queued batch for `locality` out
	/// of the map. Try-lock semantics: `Contended` means "try again later",
	/// not an error.
	pub fn dequeue(&self, locality: &Locality) -> DequeueOutcome<P> {
		let mut inner = match self.inner.try_lock() {
			Some(guard) => guard,
			None => return DequeueOutcome::Contended,
		};
		match inner.map.remove(locality) {
			Some((parcels, handlers)) => {
				inner.destinations.remove(locality);
				self.destination_count.fetch_sub(1, Ordering::AcqRel);
				DequeueOutcome::Drained(parcels, handlers)
			}
			None => DequeueOutcome::Empty,
		}
	}

	/// Take a single parcel from any non-empty destination, used by the
	/// background driver to make forward-progress guarantees without
	/// draining an entire destination's batch at once.
	pub fn dequeue_any(&self) -> Option<(Locality, P, WriteHandler<P>)> {
		let mut inner = self.inner.try_lock()?;
		let locality = inner.destinations.iter().next().cloned()?;
		let (parcels, handlers) = inner.map.get_mut(&locality)?;
		let parcel = parcels.remove(0);
		let handler = handlers.remove(0);
		if parcels.is_empty() {
			inner.map.remove(&locality);
			inner.destinations.remove(&locality);
			self.destination_count.fetch_sub(1, Ordering::AcqRel);
		}
		Some((locality, parcel, handler))
	}

	/// Best-effort check whether `locality` currently has queued parcels.
	/// Used by the completion trampoline to decide whether to re-drive.
	pub fn has_pending_for(&self, locality: &Locality) -> bool {
		match self.inner.try_lock() {
			Some(inner) => inner.destinations.contains(locality),
			None => false,
		}
	}

	/// Best-effort copy of the destination set, under try-lock.
	pub fn snapshot_destinations(&self) -> Vec<Locality> {
		match self.inner.try_lock() {
			Some(inner) => inner.destinations.iter().cloned().collect(),
			None => Vec::new(),
		}
	}

	/// Drain every destination's queue, returning all (locality, parcels,
	/// handlers) triples. Used by `stop` to fail every still-pending parcel.
	pub fn drain_all(&self) -> Vec<(Locality, Vec<P>, Vec<WriteHandler<P>>)> {
		let mut inner = self.inner.lock();
		inner.destinations.clear();
		self.destination_count.store(0, Ordering::Release);
		inner.map.drain().map(|(locality, (parcels, handlers))| (locality, parcels, handlers)).collect()
	}
}
