//! A generic, transport-agnostic parcel delivery engine for distributed
//! runtimes: a bounded connection cache, a per-destination pending queue,
//! a pluggable wire encoder, and a send pipeline tying them together
//! behind a small facade.
//!
//! The engine itself never opens a socket. It is generic over a
//! [`handler::ConnectionHandler`], the transport-specific backend that
//! actually creates connections and performs writes; [`handlers::loopback`]
//! ships a trivial in-process one to build on.

#![warn(clippy::all)]
#![cfg_attr(debug_assertions, allow(dead_code, unused_imports, unused_variables))]

pub mod background;
pub mod cache;
pub mod config;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod locality;
pub mod parcel;
pub mod pending;
pub mod pipeline;
pub mod port;
pub mod stats;

pub use background::{do_background_work, BackgroundScheduler};
pub use cache::{CacheSlot, ConnectionCache};
pub use config::PortConfig;
pub use connection::Connection;
pub use encoder::{BincodeEncoder, EncodeOutcome, Encoder};
pub use error::PortError;
pub use handler::{AsyncWrite, ConnectionHandler, HandlerCapabilities, WriteFuture};
pub use locality::{Address, Locality};
pub use parcel::{Parcel, WriteHandler};
pub use pending::PendingQueue;
pub use pipeline::SendPipeline;
pub use port::{ParcelPort, PortState};
pub use stats::StatisticKind;
