//! Kubernetes job worker
//!
//! Launches containerized workloads as Kubernetes batch Jobs on behalf of
//! remote callers and tracks each one as a session.
//!
//! Architecture:
//! - Configuration: namespace, pull policy and timings from the environment
//! - Workload: per-type manifest compilation and Job spec rendering
//! - Cluster: the gateway over the Kubernetes API
//! - Scheduler: pod readiness and service registration wait loops
//! - Service: the session lifecycle manager, log buffers and remote exec

pub mod cluster;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod workload;

pub use cluster::{ClusterGateway, KubeGateway};
pub use config::Config;
pub use error::{Result, WorkerError};
pub use service::{ProgressSink, SessionManager};
