#![forbid(unsafe_code)]

//! Session bridge between web clients and stdio JSON-RPC agent processes.

pub mod agent;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod protocol;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
