//! The [`Connection`] handle.

use crate::locality::Locality;

/// A handle to a live transport channel to a specific locality.
///
/// Exclusively owned by whichever component currently holds it: the
/// [`ConnectionCache`](crate::cache::ConnectionCache), the send pipeline, or
/// an in-flight write. Never shared concurrently.
#[derive(Debug)]
pub struct Connection<H> {
	locality: Locality,
	handle: H,
	send_buffer: Vec<u8>,
}

impl<H> Connection<H> {
	/// Wrap a handler-provided transport handle for `locality`.
	pub fn new(locality: Locality, handle: H) -> Self {
		Self { locality, handle, send_buffer: Vec::new() }
	}

	/// The destination this connection was created for.
	#[inline]
	pub fn locality(&self) -> &Locality {
		&self.locality
	}

	/// The handler-specific transport handle.
	#[inline]
	pub fn handle(&self) -> &H {
		&self.handle
	}

	/// Mutable access to the handler-specific transport handle.
	#[inline]
	pub fn handle_mut(&mut self) -> &mut H {
		&mut self.handle
	}

	/// The reusable send buffer, cleared and returned to the caller to
	/// encode a fresh batch into.
	#[inline]
	pub fn send_buffer_mut(&mut self) -> &mut Vec<u8> {
		self.send_buffer.clear();
		&mut self.send_buffer
	}

	/// Unwrap the connection into its raw handler handle.
	pub fn into_handle(self) -> H {
		self.handle
	}
}
