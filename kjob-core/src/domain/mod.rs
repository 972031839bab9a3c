//! Core domain types
//!
//! This module contains the core structures shared between the worker and
//! whatever transport exposes it. They describe sessions, the manifests
//! that start them, and the output they produce.

pub mod execution;
pub mod log;
pub mod manifest;
pub mod progress;
pub mod session;
