//! The Send Pipeline: pairs pending parcels with connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::{CacheSlot, ConnectionCache};
use crate::connection::Connection;
use crate::encoder::Encoder;
use crate::error::PortError;
use crate::handler::{AsyncWrite, ConnectionHandler};
use crate::locality::Locality;
use crate::parcel::{fire, Parcel, WriteHandler};
use crate::pending::{DequeueOutcome, PendingQueue};

/// Splits a submission-ordered batch into the leading `encoded_count`
/// entries and the unencoded tail, preserving order in both halves.
fn split_batch<P>(
	mut parcels: Vec<P>,
	mut handlers: Vec<WriteHandler<P>>,
	encoded_count: usize,
) -> (Vec<P>, Vec<WriteHandler<P>>, Vec<P>, Vec<WriteHandler<P>>) {
	let encoded_count = encoded_count.min(parcels.len());
	let tail_parcels = parcels.split_off(encoded_count);
	let tail_handlers = handlers.split_off(encoded_count);
	(parcels, handlers, tail_parcels, tail_handlers)
}

/// Orchestrates pairing pending parcels with connections, encoding, issuing
/// asynchronous writes, and handling completion.
///
/// Cheaply cloneable: every field is an `Arc` or a plain value, so the
/// completion trampoline can hold its own handle back into the pipeline to
/// re-drive a destination once a write finishes.
pub struct SendPipeline<H: ConnectionHandler, P: Parcel, E: Encoder<P>> {
	handler: Arc<H>,
	cache: Arc<ConnectionCache<H::Handle>>,
	queue: Arc<PendingQueue<P>>,
	encoder: Arc<E>,
	operations_in_flight: Arc<AtomicUsize>,
	max_outbound_message_size: usize,
	/// Fixed per handler instance: selects send-immediate mode over queued
	/// mode.
	immediate_mode: bool,
}

impl<H: ConnectionHandler, P: Parcel, E: Encoder<P>> Clone for SendPipeline<H, P, E> {
	fn clone(&self) -> Self {
		Self {
			handler: self.handler.clone(),
			cache: self.cache.clone(),
			queue: self.queue.clone(),
			encoder: self.encoder.clone(),
			operations_in_flight: self.operations_in_flight.clone(),
			max_outbound_message_size: self.max_outbound_message_size,
			immediate_mode: self.immediate_mode,
		}
	}
}

impl<H, P, E> SendPipeline<H, P, E>
where
	H: ConnectionHandler + 'static,
	H::Handle: AsyncWrite + Send + 'static,
	P: Parcel,
	E: Encoder<P> + 'static,
{
	/// Construct a pipeline over the given collaborators.
	pub fn new(
		handler: Arc<H>,
		cache: Arc<ConnectionCache<H::Handle>>,
		queue: Arc<PendingQueue<P>>,
		encoder: Arc<E>,
		operations_in_flight: Arc<AtomicUsize>,
		max_outbound_message_size: usize,
	) -> Self {
		let immediate_mode = handler.capabilities().send_immediate_parcels;
		Self { handler, cache, queue, encoder, operations_in_flight, max_outbound_message_size, immediate_mode }
	}

	/// Number of writes issued but not yet completed.
	pub fn operations_in_flight(&self) -> usize {
		self.operations_in_flight.load(Ordering::Acquire)
	}

	/// Submit a single parcel, routing to send-immediate or queued mode.
	pub fn submit(&self, locality: Locality, parcel: P, handler: WriteHandler<P>) {
		self.submit_batch(locality, vec![parcel], vec![handler]);
	}

	/// Submit a batch of parcels bound for the same locality, preserving
	/// submission order within the batch.
	pub fn submit_batch(&self, locality: Locality, parcels: Vec<P>, handlers: Vec<WriteHandler<P>>) {
		if self.immediate_mode {
			self.submit_immediate(locality, parcels, handlers);
		} else {
			self.queue.enqueue_batch(locality.clone(), parcels, handlers);
			self.drive_queued(locality);
		}
	}

	/// Re-attempt progress for `locality`, used by the background driver
	/// and by the completion trampoline.
	pub fn trigger(&self, locality: Locality) {
		if self.immediate_mode {
			if let Some((parcels, handlers)) = self.take_immediate_batch(&locality) {
				self.submit_immediate(locality, parcels, handlers);
			}
		} else {
			self.drive_queued(locality);
		}
	}

	// ---- send-immediate mode ----

	fn take_immediate_batch(&self, locality: &Locality) -> Option<(Vec<P>, Vec<WriteHandler<P>>)> {
		match self.queue.dequeue(locality) {
			DequeueOutcome::Drained(parcels, handlers) => Some((parcels, handlers)),
			DequeueOutcome::Empty | DequeueOutcome::Contended => None,
		}
	}

	fn submit_immediate(&self, locality: Locality, parcels: Vec<P>, handlers: Vec<WriteHandler<P>>) {
		match self.handler.get_connection(&locality) {
			None => {
				self.queue.enqueue_batch(locality, parcels, handlers);
			}
			Some(handle) => {
				let connection = Connection::new(locality.clone(), handle);
				self.encode_and_send(locality, connection, parcels, handlers, CompletionRoute::ViaHandler);
			}
		}
	}

	// ---- queued mode ----

	fn drive_queued(&self, locality: Locality) {
		match self.cache.get_or_reserve(&locality) {
			CacheSlot::Full => {}
			CacheSlot::Reserved => match self.handler.create_connection(&locality) {
				Ok(handle) => {
					let connection = Connection::new(locality.clone(), handle);
					self.send_from_queue(locality, connection)
				}
				Err(_) => self.cache.release_reservation(&locality),
			},
			CacheSlot::Existing(connection) => self.send_from_queue(locality, connection),
		}
	}

	fn send_from_queue(&self, locality: Locality, connection: Connection<H::Handle>) {
		match self.queue.dequeue(&locality) {
			DequeueOutcome::Drained(parcels, handlers) => {
				self.encode_and_send(locality, connection, parcels, handlers, CompletionRoute::ViaCache);
			}
			DequeueOutcome::Empty | DequeueOutcome::Contended => {
				// Another thread drained it first, or the lock was busy;
				// give the connection back for the next attempt.
				self.cache.reclaim(&locality, connection);
			}
		}
	}

	// ---- shared encode + async write + completion trampoline ----

	fn encode_and_send(
		&self,
		locality: Locality,
		mut connection: Connection<H::Handle>,
		parcels: Vec<P>,
		handlers: Vec<WriteHandler<P>>,
		route: CompletionRoute,
	) {
		let outcome = {
			let buffer = connection.send_buffer_mut();
			self.encoder.encode(&parcels, buffer, self.max_outbound_message_size)
		};
		let data = std::mem::take(connection.send_buffer_mut());

		// Partial-encoding rule: any unencoded suffix is re-enqueued at the
		// head of the destination's queue to preserve intra-batch order.
		let (sent_parcels, sent_handlers, tail_parcels, tail_handlers) =
			split_batch(parcels, handlers, outcome.encoded_count);
		if !tail_parcels.is_empty() {
			self.queue.requeue_head(locality.clone(), tail_parcels, tail_handlers);
		}

		if sent_parcels.is_empty() {
			// The encoder could not fit even the first parcel (e.g. it
			// exceeds max_outbound_message_size alone); give the
			// connection back untouched and let a later trigger retry.
			self.release_connection(&locality, connection, route);
			return;
		}

		self.operations_in_flight.fetch_add(1, Ordering::AcqRel);
		let pipeline = self.clone();
		let task_locality = locality;

		tokio::spawn(async move {
			let write_result = connection.handle_mut().write(data).await;
			pipeline.operations_in_flight.fetch_sub(1, Ordering::AcqRel);

			match &write_result {
				Ok(()) => pipeline.release_connection(&task_locality, connection, route),
				Err(_) => pipeline.discard_connection(&task_locality, connection, route),
			}

			// The engine does not propagate a transport write failure back
			// to individual handlers inside the encoded batch: every handler
			// in this batch observes the same outcome.
			for (parcel, handler) in sent_parcels.into_iter().zip(sent_handlers.into_iter()) {
				fire(handler, write_result.clone(), parcel);
			}

			if pipeline.queue.has_pending_for(&task_locality) {
				pipeline.trigger(task_locality);
			}
		});
	}

	fn release_connection(&self, locality: &Locality, connection: Connection<H::Handle>, route: CompletionRoute) {
		match route {
			CompletionRoute::ViaCache => self.cache.reclaim(locality, connection),
			CompletionRoute::ViaHandler => self.handler.reclaim_connection(locality, connection.into_handle()),
		}
	}

	fn discard_connection(&self, locality: &Locality, connection: Connection<H::Handle>, route: CompletionRoute) {
		match route {
			CompletionRoute::ViaCache => self.cache.clear_connection(locality, connection),
			CompletionRoute::ViaHandler => drop(connection),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionRoute {
	ViaCache,
	ViaHandler,
}

/// Fail every still-queued parcel with [`PortError::ShutdownError`],
/// draining the pending queue entirely. Used by `stop`.
pub fn shutdown_pending<P: Parcel>(queue: &PendingQueue<P>) {
	for (_, parcels, handlers) in queue.drain_all() {
		for (parcel, handler) in parcels.into_iter().zip(handlers.into_iter()) {
			fire(handler, Err(PortError::ShutdownError), parcel);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::handler::{HandlerCapabilities, WriteFuture};
	use std::sync::atomic::AtomicUsize as StdAtomicUsize;
	use std::sync::Mutex as StdMutex;

	fn locality(port: u16) -> Locality {
		Locality::from_socket("tcp", ([127, 0, 0, 1], port).into())
	}

	struct TestParcel {
		destination: Locality,
		payload: Vec<u8>,
	}

	impl Parcel for TestParcel {
		fn destination(&self) -> &Locality {
			&self.destination
		}
	}

	struct TestHandle;

	impl AsyncWrite for TestHandle {
		fn write(&mut self, _data: Vec<u8>) -> WriteFuture {
			Box::pin(async { Ok(()) })
		}
	}

	struct TestHandler {
		immediate: bool,
		created: StdAtomicUsize,
	}

	impl ConnectionHandler for TestHandler {
		type Handle = TestHandle;

		fn do_run(&self) -> bool {
			true
		}

		fn do_stop(&self) {}

		fn create_connection(&self, _locality: &Locality) -> Result<Self::Handle, PortError> {
			self.created.fetch_add(1, Ordering::SeqCst);
			Ok(TestHandle)
		}

		fn get_connection(&self, _locality: &Locality) -> Option<Self::Handle> {
			Some(TestHandle)
		}

		fn reclaim_connection(&self, _locality: &Locality, _handle: Self::Handle) {}

		fn background_work(&self, _num_thread: usize) -> bool {
			false
		}

		fn get_locality_name(&self) -> String {
			"test".to_string()
		}

		fn capabilities(&self) -> HandlerCapabilities {
			HandlerCapabilities { send_immediate_parcels: self.immediate, ..Default::default() }
		}
	}

	struct CountingEncoder;

	impl Encoder<TestParcel> for CountingEncoder {
		fn encode(
			&self,
			parcels: &[TestParcel],
			buffer: &mut Vec<u8>,
			_max_message_size: usize,
		) -> crate::encoder::EncodeOutcome {
			for parcel in parcels {
				buffer.extend_from_slice(&parcel.payload);
			}
			crate::encoder::EncodeOutcome { encoded_count: parcels.len() }
		}
	}

	fn build_queued_pipeline() -> SendPipeline<TestHandler, TestParcel, CountingEncoder> {
		SendPipeline::new(
			Arc::new(TestHandler { immediate: false, created: StdAtomicUsize::new(0) }),
			Arc::new(ConnectionCache::new(4, 4)),
			Arc::new(PendingQueue::new()),
			Arc::new(CountingEncoder),
			Arc::new(AtomicUsize::new(0)),
			4096,
		)
	}

	#[tokio::test]
	async fn queued_mode_fires_handler_exactly_once() {
		let pipeline = build_queued_pipeline();
		let loc = locality(10);
		let fired = Arc::new(StdMutex::new(Vec::new()));
		let fired_clone = fired.clone();

		pipeline.submit(
			loc,
			TestParcel { destination: locality(10), payload: vec![1, 2, 3] },
			Box::new(move |result, _parcel| {
				fired_clone.lock().unwrap().push(result.is_ok());
			}),
		);

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		assert_eq!(fired.lock().unwrap().len(), 1);
		assert!(fired.lock().unwrap()[0]);
		assert_eq!(pipeline.operations_in_flight(), 0);
	}

	#[tokio::test]
	async fn send_immediate_mode_fires_handler_exactly_once() {
		let pipeline: SendPipeline<TestHandler, TestParcel, CountingEncoder> = SendPipeline::new(
			Arc::new(TestHandler { immediate: true, created: StdAtomicUsize::new(0) }),
			Arc::new(ConnectionCache::new(4, 4)),
			Arc::new(PendingQueue::new()),
			Arc::new(CountingEncoder),
			Arc::new(AtomicUsize::new(0)),
			4096,
		);
		let loc = locality(11);
		let fired = Arc::new(StdMutex::new(0));
		let fired_clone = fired.clone();

		pipeline.submit(
			loc,
			TestParcel { destination: locality(11), payload: vec![9] },
			Box::new(move |_result, _parcel| {
				*fired_clone.lock().unwrap() += 1;
			}),
		);

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		assert_eq!(*fired.lock().unwrap(), 1);
	}

	#[tokio::test]
	async fn partial_encode_requeues_tail_and_eventually_fires_everyone() {
		struct OneAtATimeEncoder;
		impl Encoder<TestParcel> for OneAtATimeEncoder {
			fn encode(
				&self,
				parcels: &[TestParcel],
				buffer: &mut Vec<u8>,
				_max_message_size: usize,
			) -> crate::encoder::EncodeOutcome {
				if parcels.is_empty() {
					return crate::encoder::EncodeOutcome { encoded_count: 0 };
				}
				buffer.extend_from_slice(&parcels[0].payload);
				crate::encoder::EncodeOutcome { encoded_count: 1 }
			}
		}

		let pipeline = SendPipeline::new(
			Arc::new(TestHandler { immediate: false, created: StdAtomicUsize::new(0) }),
			Arc::new(ConnectionCache::new(4, 4)),
			Arc::new(PendingQueue::new()),
			Arc::new(OneAtATimeEncoder),
			Arc::new(AtomicUsize::new(0)),
			4096,
		);
		let loc = locality(12);
		let fired = Arc::new(StdMutex::new(Vec::new()));

		let parcels = vec![
			TestParcel { destination: loc.clone(), payload: vec![1] },
			TestParcel { destination: loc.clone(), payload: vec![2] },
			TestParcel { destination: loc.clone(), payload: vec![3] },
		];
		let handler_logs: Vec<WriteHandler<TestParcel>> = (1..=3)
			.map(|i| {
				let fired = fired.clone();
				Box::new(move |result: Result<(), PortError>, _parcel: TestParcel| {
					fired.lock().unwrap().push((i, result.is_ok()));
				}) as WriteHandler<TestParcel>
			})
			.collect();

		pipeline.submit_batch(loc, parcels, handler_logs);

		for _ in 0..20 {
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
			if fired.lock().unwrap().len() == 3 {
				break;
			}
		}

		let log = fired.lock().unwrap();
		assert_eq!(log.len(), 3);
		let order: Vec<i32> = log.iter().map(|(i, _)| *i).collect();
		assert_eq!(order, vec![1, 2, 3]);
	}
}
