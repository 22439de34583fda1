//! A trivial in-process handler that delivers writes to a shared inbox
//! instead of a real transport. Useful for tests and doctests, and as a
//! basis or example for more advanced handlers.

use std::collections::HashMap;
use std::sync::Mutex;

use parking_lot::Mutex as PLMutex;

use crate::error::PortError;
use crate::handler::{AsyncWrite, ConnectionHandler, HandlerCapabilities, WriteFuture};
use crate::locality::Locality;

/// A connection handle that appends every write to its locality's inbox.
pub struct LoopbackHandle {
	locality: Locality,
	inbox: std::sync::Arc<Mutex<HashMap<Locality, Vec<Vec<u8>>>>>,
}

impl AsyncWrite for LoopbackHandle {
	fn write(&mut self, data: Vec<u8>) -> WriteFuture {
		let locality = self.locality.clone();
		let inbox = self.inbox.clone();
		Box::pin(async move {
			inbox.lock().unwrap().entry(locality).or_default().push(data);
			Ok(())
		})
	}
}

/// A [`ConnectionHandler`] whose "transport" is a process-local inbox
/// keyed by destination [`Locality`]. Always reports send-immediate and
/// early-parcel capability since creating a loopback connection can never
/// actually block.
pub struct LoopbackHandler {
	local_name: String,
	inbox: std::sync::Arc<Mutex<HashMap<Locality, Vec<Vec<u8>>>>>,
	idle: PLMutex<HashMap<Locality, Vec<LoopbackHandle>>>,
}

impl LoopbackHandler {
	/// Construct a handler identifying itself as `local_name` in
	/// diagnostics.
	pub fn new(local_name: impl Into<String>) -> Self {
		Self {
			local_name: local_name.into(),
			inbox: std::sync::Arc::new(Mutex::new(HashMap::new())),
			idle: PLMutex::new(HashMap::new()),
		}
	}

	/// Every byte buffer delivered so far for `locality`, in delivery
	/// order.
	pub fn delivered(&self, locality: &Locality) -> Vec<Vec<u8>> {
		self.inbox.lock().unwrap().get(locality).cloned().unwrap_or_default()
	}
}

impl ConnectionHandler for LoopbackHandler {
	type Handle = LoopbackHandle;

	fn do_run(&self) -> bool {
		true
	}

	fn do_stop(&self) {
		self.idle.lock().clear();
	}

	fn create_connection(&self, locality: &Locality) -> Result<Self::Handle, PortError> {
		Ok(LoopbackHandle { locality: locality.clone(), inbox: self.inbox.clone() })
	}

	fn get_connection(&self, locality: &Locality) -> Option<Self::Handle> {
		self.idle.lock().get_mut(locality).and_then(Vec::pop).or_else(|| self.create_connection(locality).ok())
	}

	fn reclaim_connection(&self, locality: &Locality, handle: Self::Handle) {
		self.idle.lock().entry(locality.clone()).or_default().push(handle);
	}

	fn background_work(&self, _num_thread: usize) -> bool {
		false
	}

	fn get_locality_name(&self) -> String {
		self.local_name.clone()
	}

	fn capabilities(&self) -> HandlerCapabilities {
		HandlerCapabilities { send_early_parcel: true, send_immediate_parcels: true, do_background_work: false }
	}
}
