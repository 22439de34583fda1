//! The connection-handler capability interface.
//!
//! A plain trait plus a runtime-queried capability record: which optional
//! operations a handler supports is a value its implementation reports, not
//! something encoded in the type system.

use crate::error::PortError;
use crate::locality::Locality;

use std::future::Future;
use std::pin::Pin;

/// A future resolving once an async write completes, successfully or not.
pub type WriteFuture = Pin<Box<dyn Future<Output = Result<(), PortError>> + Send>>;

/// The async-write operation carried by a live connection handle.
pub trait AsyncWrite: Send {
	/// Write `data` to the peer, consuming it, and resolve once the
	/// transport confirms the write (or fails it).
	fn write(&mut self, data: Vec<u8>) -> WriteFuture;
}

/// Which optional operations a concrete [`ConnectionHandler`] supports,
/// reported by [`ConnectionHandler::capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerCapabilities {
	/// Whether [`ParcelPort::send_early_parcel`](crate::port::ParcelPort::send_early_parcel)
	/// is supported.
	pub send_early_parcel: bool,
	/// Whether [`ConnectionHandler::get_connection`] may be called to obtain
	/// a connection without blocking (the send-immediate pipeline mode).
	pub send_immediate_parcels: bool,
	/// Whether [`ConnectionHandler::background_work`] should be polled by
	/// the background progress driver.
	pub do_background_work: bool,
}

/// The pluggable transport-specific backend: the engine never opens a
/// socket itself, it only drives whatever implements this trait.
///
/// The engine holds a reference to the handler and calls through it as a
/// trait object rather than via self-dispatching generics, so a single
/// [`Connection`](crate::connection::Connection) type can stay generic over
/// any handler's handle.
pub trait ConnectionHandler: Send + Sync {
	/// A live connection handle, opaque to the engine.
	type Handle: AsyncWrite;

	/// Start the transport. Returns `false` if startup failed.
	fn do_run(&self) -> bool;

	/// Stop the transport, releasing any resources it owns.
	fn do_stop(&self);

	/// Construct a new outbound connection to `locality`.
	fn create_connection(&self, locality: &Locality) -> Result<Self::Handle, PortError>;

	/// Attempt to get a ready-to-send connection without blocking.
	///
	/// Only meaningful when [`HandlerCapabilities::send_immediate_parcels`]
	/// is set; other handlers may leave this returning `None` always.
	fn get_connection(&self, locality: &Locality) -> Option<Self::Handle>;

	/// Return a connection to the handler for reuse (send-immediate mode).
	fn reclaim_connection(&self, locality: &Locality, handle: Self::Handle);

	/// Pump handler-internal progress (e.g. draining a completion queue).
	///
	/// Only invoked when [`HandlerCapabilities::do_background_work`] is set.
	/// Returns `true` if useful work was performed.
	fn background_work(&self, num_thread: usize) -> bool;

	/// Human-readable name of this handler's locality (for diagnostics).
	fn get_locality_name(&self) -> String;

	/// This handler's static capability record.
	fn capabilities(&self) -> HandlerCapabilities;
}
