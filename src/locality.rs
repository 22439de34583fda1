//! Destination addressing for the parcel transport core.

use std::fmt;
use std::net::SocketAddr;

/// The wire address carried by a [`Locality`].
///
/// Most transports address peers by socket address, but the engine itself
/// does not assume IP networking — a connection handler is a pluggable
/// transport, e.g. shared-memory or an RDMA-like fabric — so an opaque byte
/// address is also supported.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
	/// A socket address, used by TCP/UDP-style handlers.
	Socket(SocketAddr),
	/// An opaque transport-specific address (e.g. a shared-memory segment id).
	Opaque(Vec<u8>),
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Socket(addr) => write!(f, "{}", addr),
			Self::Opaque(bytes) => write!(f, "opaque:{}", hex_encode(bytes)),
		}
	}
}

fn hex_encode(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// An opaque destination identifier.
///
/// Two localities are equal iff their wire addresses match. The `type_tag`
/// records which connection handler a locality belongs to
/// (e.g. `"tcp"`, `"shmem"`), so a port configured for one transport never
/// mistakes an address belonging to another for one of its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locality {
	type_tag: &'static str,
	address: Address,
}

impl Locality {
	/// Construct a locality with a socket address.
	pub fn from_socket(type_tag: &'static str, addr: SocketAddr) -> Self {
		Self { type_tag, address: Address::Socket(addr) }
	}

	/// Construct a locality with an opaque transport-specific address.
	pub fn from_opaque(type_tag: &'static str, addr: Vec<u8>) -> Self {
		Self { type_tag, address: Address::Opaque(addr) }
	}

	/// The transport type tag this locality belongs to.
	#[inline]
	pub fn type_tag(&self) -> &'static str {
		self.type_tag
	}

	/// The wire address of this locality.
	#[inline]
	pub fn address(&self) -> &Address {
		&self.address
	}
}

impl fmt::Display for Locality {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}://{}", self.type_tag, self.address)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn equal_addresses_are_equal_localities() {
		let a = Locality::from_socket("tcp", "127.0.0.1:2100".parse().unwrap());
		let b = Locality::from_socket("tcp", "127.0.0.1:2100".parse().unwrap());
		assert_eq!(a, b);
	}

	#[test]
	fn different_addresses_are_different_localities() {
		let a = Locality::from_socket("tcp", "127.0.0.1:2100".parse().unwrap());
		let b = Locality::from_socket("tcp", "127.0.0.1:2101".parse().unwrap());
		assert_ne!(a, b);
	}

	#[test]
	fn localities_are_totally_ordered() {
		let a = Locality::from_socket("tcp", "127.0.0.1:2100".parse().unwrap());
		let b = Locality::from_socket("tcp", "127.0.0.1:2101".parse().unwrap());
		assert!(a < b || b < a);
	}
}
