//! Background Progress Driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::encoder::Encoder;
use crate::handler::{AsyncWrite, ConnectionHandler};
use crate::parcel::Parcel;
use crate::pending::PendingQueue;
use crate::pipeline::SendPipeline;

/// `do_background_work` is called by worker threads between scheduler
/// ticks. Each call is bounded: it snapshots the current
/// destination set once and makes a single non-blocking attempt per
/// destination, never looping unboundedly.
pub fn do_background_work<H, P, E>(
	pipeline: &SendPipeline<H, P, E>,
	queue: &PendingQueue<P>,
	handler: &H,
	num_thread: usize,
) -> bool
where
	H: ConnectionHandler + 'static,
	H::Handle: AsyncWrite + Send + 'static,
	P: Parcel,
	E: Encoder<P> + 'static,
{
	let destinations = queue.snapshot_destinations();
	let did_trigger = !destinations.is_empty();
	for locality in destinations {
		pipeline.trigger(locality);
	}

	let did_background_work =
		if handler.capabilities().do_background_work { handler.background_work(num_thread) } else { false };

	did_trigger || did_background_work
}

/// Distributes `do_background_work` calls across a bounded number of
/// worker slots via a round-robin counter.
#[derive(Debug)]
pub struct RoundRobinCounter {
	next: AtomicUsize,
	max_background_threads: usize,
}

impl RoundRobinCounter {
	/// Construct a counter bounded by `max_background_threads`.
	pub fn new(max_background_threads: usize) -> Self {
		Self { next: AtomicUsize::new(0), max_background_threads: max_background_threads.max(1) }
	}

	/// Claim the next worker slot, wrapping modulo `max_background_threads`.
	pub fn next_slot(&self) -> usize {
		self.next.fetch_add(1, Ordering::Relaxed) % self.max_background_threads
	}
}

/// A convenience runtime-glue layer that periodically calls
/// `do_background_work` on `max_background_threads` tokio tasks, for
/// callers who don't already run their own scheduler loop. The core engine
/// stays runtime-agnostic; this struct is the optional tokio adapter around
/// it.
pub struct BackgroundScheduler {
	handles: Vec<tokio::task::JoinHandle<()>>,
}

impl BackgroundScheduler {
	/// Spawn `max_background_threads` tasks, each calling
	/// `do_background_work` on `tick_interval`.
	pub fn spawn<H, P, E>(
		pipeline: SendPipeline<H, P, E>,
		queue: Arc<PendingQueue<P>>,
		handler: Arc<H>,
		max_background_threads: usize,
		tick_interval: Duration,
	) -> Self
	where
		H: ConnectionHandler + 'static,
		H::Handle: AsyncWrite + Send + 'static,
		P: Parcel,
		E: Encoder<P> + 'static,
	{
		let counter = Arc::new(RoundRobinCounter::new(max_background_threads));
		let mut handles = Vec::with_capacity(max_background_threads);
		for _ in 0..max_background_threads {
			let pipeline = pipeline.clone();
			let queue = queue.clone();
			let handler = handler.clone();
			let counter = counter.clone();
			handles.push(tokio::spawn(async move {
				let mut interval = tokio::time::interval(tick_interval);
				loop {
					interval.tick().await;
					let num_thread = counter.next_slot();
					do_background_work(&pipeline, &queue, &handler, num_thread);
				}
			}));
		}
		Self { handles }
	}

	/// Stop every spawned background task.
	pub fn stop(self) {
		for handle in self.handles {
			handle.abort();
		}
	}
}
