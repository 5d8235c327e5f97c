#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod fanout;
pub mod http;
pub mod ipc;
pub mod models;
pub mod node;

pub use config::RelayConfig;
pub use errors::{AppError, Result};
