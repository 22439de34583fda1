//! Reference [`ConnectionHandler`](crate::handler::ConnectionHandler)
//! implementations, built as a basis or example for more advanced handlers
//! provided by downstream crates.

pub mod loopback;
