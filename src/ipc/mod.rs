//! Cross-process relay layer.
//!
//! Worker processes push notifications over a Unix domain socket (or
//! loopback TCP where those are unavailable) to the single process that
//! owns the endpoint, which fans them out to live client sessions.

pub mod client;
pub mod codec;
pub mod rendezvous;
pub mod server;
pub mod transport;
