//! Collaborator traits consumed by the resolution cache.
//!
//! [`crate::ArmClient`] implements both against Azure Resource Manager; tests
//! substitute in-memory fakes.

use std::future::Future;

use crate::types::{QueryResponse, ScaleSet, VirtualMachine};
use crate::Error;

/// Compute listing calls.
pub trait ComputeApi: Send + Sync {
    /// Lists every scale set (of any orchestration mode) in a resource group.
    fn list_scale_sets(
        &self,
        resource_group: &str,
    ) -> impl Future<Output = Result<Vec<ScaleSet>, Error>> + Send;

    /// Lists the static model of every VM in a flexible scale set.
    fn list_flex_vms_without_instance_view(
        &self,
        scale_set_id: &str,
    ) -> impl Future<Output = Result<Vec<VirtualMachine>, Error>> + Send;

    /// Lists only the instance views of every VM in a flexible scale set.
    fn list_flex_vms_with_only_instance_view(
        &self,
        scale_set_id: &str,
    ) -> impl Future<Output = Result<Vec<VirtualMachine>, Error>> + Send;
}

/// Azure Resource Graph.
pub trait ResourceGraphApi: Send + Sync {
    fn send_query(
        &self,
        subscription_id: &str,
        query: &str,
    ) -> impl Future<Output = Result<QueryResponse, Error>> + Send;
}
