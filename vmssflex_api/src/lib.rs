//! Azure Resource Manager types and client for the calls needed to resolve
//! Kubernetes nodes to flexible scale set VMs.

mod api;
mod client;
mod errors;
pub mod query;
pub mod transport;
pub mod types;
pub use self::api::{ComputeApi, ResourceGraphApi};
pub use self::client::ArmClient;
pub use self::errors::Error;
pub use self::query::{ApiVersion, ComputerNameQuery, FlexVmListQuery, Query};
pub use self::transport::{Transport, TransportConfig};
