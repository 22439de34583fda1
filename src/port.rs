//! The Port Facade: the engine's public surface.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::ConnectionCache;
use crate::config::PortConfig;
use crate::encoder::Encoder;
use crate::error::PortError;
use crate::handler::{AsyncWrite, ConnectionHandler};
use crate::locality::Locality;
use crate::parcel::{Parcel, WriteHandler};
use crate::pending::PendingQueue;
use crate::pipeline::{shutdown_pending, SendPipeline};
use crate::stats::StatisticKind;

const CONSTRUCTED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;
const TERMINATED: u8 = 3;

const INVALIDATION_DELAY: Duration = Duration::from_millis(100);

/// The engine's lifecycle: *constructed → running → stopping → terminated*.
/// No new parcels may be accepted once stopping has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
	/// Built but `run()` has not yet been called.
	Constructed,
	/// Accepting and sending parcels normally.
	Running,
	/// `stop()` has been invoked; draining in-flight work.
	Stopping,
	/// Fully drained and shut down.
	Terminated,
}

fn decode_state(value: u8) -> PortState {
	match value {
		CONSTRUCTED => PortState::Constructed,
		RUNNING => PortState::Running,
		STOPPING => PortState::Stopping,
		_ => PortState::Terminated,
	}
}

/// The parcel transport core's public surface.
pub struct ParcelPort<H: ConnectionHandler, P: Parcel, E: Encoder<P>> {
	handler: Arc<H>,
	cache: Arc<ConnectionCache<H::Handle>>,
	queue: Arc<PendingQueue<P>>,
	pipeline: SendPipeline<H, P, E>,
	state: Arc<AtomicU8>,
	config: PortConfig,
}

impl<H, P, E> Clone for ParcelPort<H, P, E>
where
	H: ConnectionHandler,
	P: Parcel,
	E: Encoder<P>,
{
	fn clone(&self) -> Self {
		Self {
			handler: self.handler.clone(),
			cache: self.cache.clone(),
			queue: self.queue.clone(),
			pipeline: self.pipeline.clone(),
			state: self.state.clone(),
			config: self.config.clone(),
		}
	}
}

impl<H, P, E> ParcelPort<H, P, E>
where
	H: ConnectionHandler + 'static,
	H::Handle: AsyncWrite + Send + 'static,
	P: Parcel,
	E: Encoder<P> + 'static,
{
	/// Construct a port over `handler`, encoding outbound batches with
	/// `encoder` according to `config`.
	pub fn new(handler: H, encoder: E, config: PortConfig) -> Self {
		let handler = Arc::new(handler);
		let cache = Arc::new(ConnectionCache::new(config.max_connections, config.max_connections_per_locality));
		let queue = Arc::new(PendingQueue::new());
		let operations_in_flight = Arc::new(AtomicUsize::new(0));
		// A generous default; callers needing a precise wire limit should
		// size their encoder accordingly (max_outbound_message_size is a
		// connection-handler concern).
		let max_outbound_message_size = 64 * 1024;
		let pipeline = SendPipeline::new(
			handler.clone(),
			cache.clone(),
			queue.clone(),
			Arc::new(encoder),
			operations_in_flight,
			max_outbound_message_size,
		);
		Self { handler, cache, queue, pipeline, state: Arc::new(AtomicU8::new(CONSTRUCTED)), config }
	}

	/// Current lifecycle state.
	pub fn state(&self) -> PortState {
		decode_state(self.state.load(Ordering::Acquire))
	}

	/// Start the underlying transport and transition to `Running`.
	pub fn run(&self) -> bool {
		let started = self.handler.do_run();
		if started {
			self.state.store(RUNNING, Ordering::Release);
			info!(locality = %self.handler.get_locality_name(), "parcel port running");
		}
		started
	}

	/// Resolve a not-yet-ready parcel before submitting it. Parcel
	/// construction itself is out of scope for this crate; this is only an
	/// extension point so callers building parcels asynchronously (e.g.
	/// from a GID allocator) don't need a separate channel back into
	/// `put_parcel`.
	pub async fn await_parcel<F>(&self, parcel_future: F) -> P
	where
		F: std::future::IntoFuture<Output = P>,
	{
		parcel_future.into_future().await
	}

	fn rejecting_new_parcels(&self) -> bool {
		matches!(self.state.load(Ordering::Acquire), STOPPING | TERMINATED)
	}

	/// Submit a single parcel for `dest`, invoking `handler` exactly once
	/// when it completes.
	pub fn put_parcel(&self, dest: Locality, parcel: P, handler: WriteHandler<P>) -> Result<(), PortError> {
		if self.rejecting_new_parcels() {
			handler(Err(PortError::ShutdownError), parcel);
			return Err(PortError::ShutdownError);
		}
		self.pipeline.submit(dest, parcel, handler);
		Ok(())
	}

	/// Submit a batch of parcels for `dest`. All parcels must already carry
	/// `dest` as their destination and `parcels.len()` must equal
	/// `handlers.len()`, or [`PortError::BadParameter`] is raised
	/// synchronously.
	pub fn put_parcels(
		&self,
		dest: Locality,
		parcels: Vec<P>,
		handlers: Vec<WriteHandler<P>>,
	) -> Result<(), PortError> {
		if parcels.len() != handlers.len() {
			return Err(PortError::bad_parameter(format!(
				"put_parcels: {} parcels but {} handlers",
				parcels.len(),
				handlers.len()
			)));
		}
		if parcels.iter().any(|p| p.destination() != &dest) {
			return Err(PortError::bad_parameter("put_parcels: all parcels must share the destination"));
		}
		if self.rejecting_new_parcels() {
			for (parcel, handler) in parcels.into_iter().zip(handlers.into_iter()) {
				handler(Err(PortError::ShutdownError), parcel);
			}
			return Err(PortError::ShutdownError);
		}
		self.pipeline.submit_batch(dest, parcels, handlers);
		Ok(())
	}

	/// Send `parcel` using a built-in handler that discards the result,
	/// if the connection handler supports early parcels; otherwise raises
	/// [`PortError::NetworkError`].
	pub fn send_early_parcel(&self, dest: Locality, parcel: P) -> Result<(), PortError> {
		if !self.handler.capabilities().send_early_parcel {
			return Err(PortError::network("handler does not support send_early_parcel"));
		}
		self.put_parcel(dest, parcel, Box::new(|_result, _parcel| {}))
	}

	/// Cooperatively yields until there are no in-flight writes and no
	/// queued parcels.
	pub async fn flush_parcels(&self) {
		while self.pipeline.operations_in_flight() != 0 || self.queue.has_pending() {
			tokio::task::yield_now().await;
		}
	}

	/// Blocking variant of [`flush_parcels`](Self::flush_parcels) for
	/// callers outside a tokio context.
	pub fn flush_parcels_blocking(&self) {
		while self.pipeline.operations_in_flight() != 0 || self.queue.has_pending() {
			std::thread::yield_now();
		}
	}

	/// Drain and shut the port down. Always flushes
	/// first; when `blocking` is true, additionally shuts the connection
	/// cache, stops the handler, and waits for that to complete before
	/// returning. When `blocking` is false, the same steps run on a
	/// detached task and `stop` returns immediately.
	pub async fn stop(&self, blocking: bool) {
		self.state.store(STOPPING, Ordering::Release);
		if blocking {
			self.drain_and_terminate().await;
		} else {
			let this = self.clone();
			tokio::spawn(async move { this.drain_and_terminate().await });
		}
	}

	async fn drain_and_terminate(&self) {
		// Unlike flush_parcels, this only waits for writes already in
		// flight: a parcel stuck in the pending queue because the cache
		// can never grant it a connection (e.g. zero capacity) must not
		// block stop() forever. Anything still queued once in-flight work
		// has settled is force-failed below.
		while self.pipeline.operations_in_flight() != 0 {
			tokio::task::yield_now().await;
		}
		shutdown_pending(&self.queue);
		self.cache.shutdown();
		self.handler.do_stop();
		self.state.store(TERMINATED, Ordering::Release);
		debug!(locality = %self.handler.get_locality_name(), "parcel port terminated");
	}

	/// Schedule a delayed cache invalidation for `locality`. Deferred by
	/// 100ms to avoid racing a just-issued write; if operations remain in
	/// flight after the delay, the wait repeats.
	pub fn remove_from_connection_cache(&self, locality: Locality) {
		let this = self.clone();
		tokio::spawn(async move {
			loop {
				tokio::time::sleep(INVALIDATION_DELAY).await;
				if this.pipeline.operations_in_flight() == 0 {
					this.cache.clear_locality(&locality);
					return;
				}
				warn!(%locality, "deferring connection cache invalidation, operations still in flight");
			}
		});
	}

	/// Read a connection-cache statistic, optionally resetting it to zero.
	pub fn statistic(&self, kind: StatisticKind, reset: bool) -> i64 {
		self.cache.statistic(kind, reset)
	}

	/// Number of idle (reusable, not reserved or in-use) connections
	/// currently cached for `locality`.
	pub fn idle_connections(&self, locality: &Locality) -> usize {
		self.cache.idle_count(locality)
	}

	/// Number of writes issued but not yet completed.
	pub fn operations_in_flight(&self) -> usize {
		self.pipeline.operations_in_flight()
	}

	/// Spawn the bundled `tokio` background driver at `config().max_background_threads`,
	/// ticking every `tick_interval`.
	pub fn spawn_background_scheduler(&self, tick_interval: Duration) -> crate::background::BackgroundScheduler {
		crate::background::BackgroundScheduler::spawn(
			self.pipeline.clone(),
			self.queue.clone(),
			self.handler.clone(),
			self.config.max_background_threads,
			tick_interval,
		)
	}

	/// This port's configuration.
	pub fn config(&self) -> &PortConfig {
		&self.config
	}
}
