//! Shared scaffolding for the parcel port's testable-property scenarios.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parcel_port::{
	AsyncWrite, ConnectionHandler, EncodeOutcome, Encoder, HandlerCapabilities, Locality, Parcel,
	PortError, WriteFuture,
};

pub fn locality(port: u16) -> Locality {
	Locality::from_socket("tcp", ([127, 0, 0, 1], port).into())
}

pub struct ScenarioParcel {
	destination: Locality,
	pub payload: Vec<u8>,
}

impl ScenarioParcel {
	pub fn new(destination: Locality, payload: Vec<u8>) -> Self {
		Self { destination, payload }
	}
}

impl Parcel for ScenarioParcel {
	fn destination(&self) -> &Locality {
		&self.destination
	}
}

/// Encodes up to `per_call` parcels per invocation, counting how many times
/// it has been called through a shared counter the test harness can read
/// after the encoder has been handed off to the port.
pub struct ChunkEncoder {
	pub per_call: usize,
	pub calls: Arc<AtomicUsize>,
}

impl ChunkEncoder {
	pub fn new(per_call: usize) -> Self {
		Self { per_call, calls: Arc::new(AtomicUsize::new(0)) }
	}

	pub fn call_counter(&self) -> Arc<AtomicUsize> {
		self.calls.clone()
	}
}

impl Encoder<ScenarioParcel> for ChunkEncoder {
	fn encode(&self, parcels: &[ScenarioParcel], buffer: &mut Vec<u8>, _max_message_size: usize) -> EncodeOutcome {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let encoded_count = parcels.len().min(self.per_call);
		for parcel in &parcels[..encoded_count] {
			buffer.extend_from_slice(&parcel.payload);
		}
		EncodeOutcome { encoded_count }
	}
}

/// A queued-mode (not send-immediate) handler whose handles record every
/// write and can be made to fail the first `fail_first_n` writes per
/// locality.
pub struct RecordingHandler {
	fail_first_n: usize,
	write_delay: Duration,
	attempts: Mutex<std::collections::HashMap<Locality, usize>>,
	pub delivered: Arc<Mutex<Vec<Vec<u8>>>>,
	pub created: AtomicUsize,
	pub stopped: AtomicBool,
}

impl RecordingHandler {
	pub fn new(fail_first_n: usize) -> Self {
		Self {
			fail_first_n,
			write_delay: Duration::ZERO,
			attempts: Mutex::new(std::collections::HashMap::new()),
			delivered: Arc::new(Mutex::new(Vec::new())),
			created: AtomicUsize::new(0),
			stopped: AtomicBool::new(false),
		}
	}

	pub fn with_write_delay(fail_first_n: usize, write_delay: Duration) -> Self {
		Self { write_delay, ..Self::new(fail_first_n) }
	}
}

pub struct RecordingHandle {
	locality: Locality,
	should_fail: bool,
	write_delay: Duration,
	delivered: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl AsyncWrite for RecordingHandle {
	fn write(&mut self, data: Vec<u8>) -> WriteFuture {
		let should_fail = self.should_fail;
		let write_delay = self.write_delay;
		let delivered = self.delivered.clone();
		Box::pin(async move {
			if !write_delay.is_zero() {
				tokio::time::sleep(write_delay).await;
			}
			if should_fail {
				Err(PortError::network("simulated write failure"))
			} else {
				delivered.lock().unwrap().push(data);
				Ok(())
			}
		})
	}
}

impl ConnectionHandler for RecordingHandler {
	type Handle = RecordingHandle;

	fn do_run(&self) -> bool {
		true
	}

	fn do_stop(&self) {
		self.stopped.store(true, Ordering::SeqCst);
	}

	fn create_connection(&self, locality: &Locality) -> Result<Self::Handle, PortError> {
		self.created.fetch_add(1, Ordering::SeqCst);
		let mut attempts = self.attempts.lock().unwrap();
		let count = attempts.entry(locality.clone()).or_insert(0);
		let should_fail = *count < self.fail_first_n;
		*count += 1;
		Ok(RecordingHandle {
			locality: locality.clone(),
			should_fail,
			write_delay: self.write_delay,
			delivered: self.delivered.clone(),
		})
	}

	fn get_connection(&self, _locality: &Locality) -> Option<Self::Handle> {
		None
	}

	fn reclaim_connection(&self, _locality: &Locality, _handle: Self::Handle) {}

	fn background_work(&self, _num_thread: usize) -> bool {
		false
	}

	fn get_locality_name(&self) -> String {
		"recording".to_string()
	}

	fn capabilities(&self) -> HandlerCapabilities {
		HandlerCapabilities { send_early_parcel: false, send_immediate_parcels: false, do_background_work: false }
	}
}
