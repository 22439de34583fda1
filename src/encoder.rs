//! Stateless parcel-to-wire encoding.

use crate::parcel::Parcel;

/// Outcome of a single [`Encoder::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOutcome {
	/// Number of leading parcels from the input slice that were encoded
	/// into the buffer. Always `<= total parcels passed in`.
	pub encoded_count: usize,
}

/// Turns parcels into bytes on a destination buffer.
///
/// Implementations are free to stop short of encoding every parcel if doing
/// so would overflow `max_message_size`; the pipeline is responsible for
/// re-submitting any unencoded suffix.
pub trait Encoder<P: Parcel>: Send + Sync {
	/// Encode as many of `parcels` as fit within `max_message_size` bytes
	/// into `buffer`, appending to whatever `buffer` already contains.
	fn encode(&self, parcels: &[P], buffer: &mut Vec<u8>, max_message_size: usize) -> EncodeOutcome;
}

/// Default wire encoder, serializing each parcel with `bincode` and
/// length-prefixing it with a `u32`.
///
/// The wire format is otherwise an external collaborator's concern; this
/// implementation exists so the crate is usable without every caller
/// writing their own encoder.
pub struct BincodeEncoder;

impl<P: Parcel + serde::Serialize> Encoder<P> for BincodeEncoder {
	fn encode(&self, parcels: &[P], buffer: &mut Vec<u8>, max_message_size: usize) -> EncodeOutcome {
		let mut encoded_count = 0;
		for parcel in parcels {
			let size = match bincode::serialized_size(parcel) {
				Ok(size) => size as usize,
				Err(_) => break,
			};
			let needed = buffer.len() + 4 + size;
			if needed > max_message_size {
				break;
			}
			let start = buffer.len();
			buffer.extend_from_slice(&(size as u32).to_le_bytes());
			buffer.resize(start + 4 + size, 0);
			if bincode::serialize_into(&mut buffer[start + 4..start + 4 + size], parcel).is_err() {
				buffer.truncate(start);
				break;
			}
			encoded_count += 1;
		}
		EncodeOutcome { encoded_count }
	}
}
