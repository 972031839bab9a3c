//! Data Transfer Objects for the worker's inbound operations
//!
//! DTOs are the argument and return shapes of `start`, `compile`,
//! `get_logs` and `execute` as seen by the RPC layer.

pub mod execution;
pub mod log;
pub mod session;
