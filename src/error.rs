//! Error taxonomy for the parcel transport core.

use thiserror::Error;

/// Errors raised synchronously from the facade or delivered asynchronously
/// through a parcel's [`WriteHandler`](crate::parcel::WriteHandler).
#[derive(Debug, Error, Clone)]
pub enum PortError {
	/// Invalid call arguments: mismatched vector lengths, or a batch whose
	/// parcels target more than one destination.
	#[error("bad parameter: {0}")]
	BadParameter(String),

	/// An operation unsupported by the configured connection handler (e.g.
	/// an early parcel sent to a handler without the capability), or a
	/// connection/write failure surfaced by the handler.
	#[error("network error: {0}")]
	NetworkError(String),

	/// The transport or an allocator-style collaborator failed to allocate
	/// memory for a send buffer or connection.
	#[error("out of memory: {0}")]
	OutOfMemory(String),

	/// A lower-level kernel or device call failed (e.g. an RDMA device
	/// error) surfaced through the connection handler.
	#[error("kernel error: {0}")]
	KernelError(String),

	/// Delivered to the handler of a parcel that was still pending when
	/// [`stop`](crate::port::ParcelPort::stop) was invoked.
	#[error("parcel port is shutting down")]
	ShutdownError,
}

impl PortError {
	/// Construct a [`PortError::BadParameter`] from a displayable reason.
	pub fn bad_parameter(reason: impl Into<String>) -> Self {
		Self::BadParameter(reason.into())
	}

	/// Construct a [`PortError::NetworkError`] from a displayable reason.
	pub fn network(reason: impl Into<String>) -> Self {
		Self::NetworkError(reason.into())
	}
}
