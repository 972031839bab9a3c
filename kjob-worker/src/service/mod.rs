//! Service layer
//!
//! Services hold the worker's business logic. The [`SessionManager`] owns the
//! session registry and orchestrates the workload builders, the cluster
//! gateway and the startup wait loops; the remaining modules are its parts.

pub mod exec;
pub mod lifecycle;
pub mod log_buffer;
pub mod progress;
pub mod registry;

pub use lifecycle::SessionManager;
pub use log_buffer::SessionLogs;
pub use progress::{ProgressSink, StartupReporter};
pub use registry::{SessionData, SessionRegistry};
