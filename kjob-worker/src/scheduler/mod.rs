//! Startup wait loops
//!
//! Bounded polling loops that block one session's startup until its workload
//! is observable: first its pod, then (for self-registering workloads) its
//! service on the mesh. Each loop suspends between polls, so concurrent
//! startups never block each other.

pub mod pod_poller;
pub mod service_waiter;

pub use pod_poller::{PodReadiness, wait_for_pod};
pub use service_waiter::{ServiceRegistry, wait_for_service};
