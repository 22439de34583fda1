//! Configuration keys recognized under `parcel.<handler-name>`.

use serde::{Deserialize, Serialize};

/// Byte order used when an encoder writes multi-byte fields, selected by
/// the top-level `parcel.endian_out` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
	/// Little-endian wire encoding.
	Little,
	/// Big-endian wire encoding.
	Big,
}

impl Default for Endian {
	fn default() -> Self {
		Self::Little
	}
}

fn default_io_pool_size() -> usize {
	2
}

fn default_max_connections() -> usize {
	512
}

fn default_max_connections_per_locality() -> usize {
	4
}

fn default_max_background_threads() -> usize {
	4
}

/// Per-port configuration, deserializable from the `parcel.<handler-name>`
/// namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
	/// Number of I/O threads dedicated to this port.
	pub io_pool_size: usize,
	/// Global connection cache capacity.
	pub max_connections: usize,
	/// Per-destination connection cache capacity.
	pub max_connections_per_locality: usize,
	/// Upper bound on the round-robin slot used by the background driver.
	pub max_background_threads: usize,
	/// Wire byte order for multi-byte encoded fields.
	pub endian_out: Endian,
}

impl Default for PortConfig {
	fn default() -> Self {
		Self {
			io_pool_size: default_io_pool_size(),
			max_connections: default_max_connections(),
			max_connections_per_locality: default_max_connections_per_locality(),
			max_background_threads: default_max_background_threads(),
			endian_out: Endian::default(),
		}
	}
}
