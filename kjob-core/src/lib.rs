//! kjob Core
//!
//! Core types and abstractions for the kjob Kubernetes session worker.
//!
//! This crate contains:
//! - Domain types: Core entities (Session, Manifest, log items, execution results)
//! - DTOs: Request/response shapes exchanged with the RPC layer

pub mod domain;
pub mod dto;
