//! Parcel and completion-handler definitions.

use crate::error::PortError;
use crate::locality::Locality;

/// A serialized remote invocation message owned by the engine from
/// [`put_parcel`](crate::port::ParcelPort::put_parcel) until its handler
/// fires.
///
/// Serialization is the [`Encoder`](crate::encoder::Encoder)'s job, not the
/// parcel's: a parcel only needs to know where it's going, so an encoder can
/// turn a batch of them into wire bytes however it likes.
pub trait Parcel: Send + 'static {
	/// The locality this parcel must be delivered to.
	fn destination(&self) -> &Locality;
}

/// Single-shot completion callback bound to exactly one parcel.
///
/// Invoked with `(error, parcel)` exactly once; consumes the parcel. Boxed
/// rather than expressed as a fresh trait, since callers only ever need a
/// one-off closure here.
pub type WriteHandler<P> = Box<dyn FnOnce(Result<(), PortError>, P) + Send>;

/// Invoke a handler with its result and the parcel it completes.
#[inline]
pub(crate) fn fire<P: Parcel>(handler: WriteHandler<P>, result: Result<(), PortError>, parcel: P) {
	handler(result, parcel);
}
