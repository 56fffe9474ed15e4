//! Azure Resource Manager client for the scale set, VM and resource graph calls.

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::{
    api::{ComputeApi, ResourceGraphApi},
    query::{with_api_version, ApiVersion, FlexVmListQuery, Query},
    transport::{Transport, TransportConfig},
    types::{ListResult, QueryResponse, ScaleSet, VirtualMachine},
    Error,
};

/// Upper bound on followed `nextLink`s, guarding against a server that loops.
const MAX_PAGES: usize = 1000;

/// ARM client bound to one subscription.
///
/// Shares its [`Transport`] with any other client built from the same one.
#[derive(Clone)]
pub struct ArmClient {
    transport: Transport,
    subscription_id: String,
}

impl ArmClient {
    pub fn new(transport: Transport, subscription_id: &str) -> Self {
        Self {
            transport,
            subscription_id: subscription_id.to_string(),
        }
    }

    /// Creates a client with its own transport pointing at a custom endpoint. Used for testing.
    pub fn with_base_url(base_url: &str, subscription_id: &str) -> Result<Self, Error> {
        let transport = Transport::new(TransportConfig::with_endpoint(base_url))?;
        Ok(Self::new(transport, subscription_id))
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Fetches every page of a list operation.
    async fn list_all<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>, Error> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                tracing::error!("Stopped following nextLink after {} pages", MAX_PAGES);
                return Err(Error::Malformed("too many result pages".to_string()));
            }
            let page: ListResult<T> = self.transport.get_json(url).await?;
            items.extend(page.value);
            next = match page.next_link.filter(|l| !l.is_empty()) {
                Some(link) => Some(Url::parse(&link).map_err(|e| {
                    tracing::error!("Invalid nextLink {}: {}", link, e);
                    Error::Malformed(format!("invalid nextLink: {}", e))
                })?),
                None => None,
            };
        }
        Ok(items)
    }

    fn flex_vm_url(&self, query: &FlexVmListQuery) -> Result<Url, Error> {
        let url = self.transport.url(&[
            "subscriptions",
            &self.subscription_id,
            "providers",
            "Microsoft.Compute",
            "virtualMachines",
        ])?;
        Ok(query.add_to_url(&with_api_version(&url, ApiVersion::Compute)))
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    subscriptions: [&'a str; 1],
    query: &'a str,
}

impl ComputeApi for ArmClient {
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<ScaleSet>, Error> {
        let url = self.transport.url(&[
            "subscriptions",
            &self.subscription_id,
            "resourceGroups",
            resource_group,
            "providers",
            "Microsoft.Compute",
            "virtualMachineScaleSets",
        ])?;
        self.list_all(with_api_version(&url, ApiVersion::Compute)).await
    }

    async fn list_flex_vms_without_instance_view(
        &self,
        scale_set_id: &str,
    ) -> Result<Vec<VirtualMachine>, Error> {
        let url = self.flex_vm_url(&FlexVmListQuery::new(scale_set_id))?;
        self.list_all(url).await
    }

    async fn list_flex_vms_with_only_instance_view(
        &self,
        scale_set_id: &str,
    ) -> Result<Vec<VirtualMachine>, Error> {
        let url = self.flex_vm_url(&FlexVmListQuery::new(scale_set_id).with_status_only())?;
        self.list_all(url).await
    }
}

impl ResourceGraphApi for ArmClient {
    async fn send_query(&self, subscription_id: &str, query: &str) -> Result<QueryResponse, Error> {
        let url = self.transport.url(&["providers", "Microsoft.ResourceGraph", "resources"])?;
        let body = QueryRequest {
            subscriptions: [subscription_id],
            query,
        };
        self.transport
            .post_json(with_api_version(&url, ApiVersion::ResourceGraph), &body)
            .await
    }
}
