//! Fan-out of relayed messages to live client sessions.

pub mod registry;
