//! In-memory resolution of Kubernetes node names to flexible scale set VMs.
//!
//! Wraps the `vmssflex_api` client with TTL caches of scale sets and their
//! VMs, secondary node indices, and per-key locking so concurrent lookups
//! share remote calls.

pub mod cache;
pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod refresh;
pub mod resolver;

pub use vmssflex_api;
pub use vmssflex_api::types;
pub use vmssflex_api::{ArmClient, ComputeApi, ResourceGraphApi, Transport, TransportConfig};

pub use cache::ReadPolicy;
pub use collections::{ScaleSetCollection, VmCollection};
pub use config::CacheConfig;
pub use error::CacheError;
pub use graph::{ComputerNameLookup, ReadLimiter, Unlimited};
pub use index::NodeIndex;
pub use resolver::FlexScaleSetCache;
