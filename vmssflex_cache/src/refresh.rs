//! Refresh functions that populate the scale set and VM caches from ARM.

use std::sync::Arc;

use vmssflex_api::ComputeApi;

use crate::cache::{Refresh, TimedCache};
use crate::collections::{ScaleSetCollection, VmCollection};
use crate::error::CacheError;
use crate::index::NodeIndex;

/// Lists the VMs of one flexible scale set, merged with their instance views.
///
/// The cache key is the scale set id. Once both listings succeeded, index
/// entries of members that are no longer listed are dropped and every listed
/// VM is absorbed.
pub struct VmCollectionRefresher<C> {
    client: Arc<C>,
    index: Arc<NodeIndex>,
}

impl<C: ComputeApi> VmCollectionRefresher<C> {
    pub fn new(client: Arc<C>, index: Arc<NodeIndex>) -> Self {
        Self { client, index }
    }

    fn listing_failed(
        &self,
        operation: &'static str,
        scale_set_id: &str,
        err: vmssflex_api::Error,
    ) -> CacheError {
        let err = CacheError::from_api(operation, scale_set_id, err);
        if err.is_not_found() {
            let removed = self.index.remove_scale_set(scale_set_id);
            tracing::info!(
                "Scale set {} no longer exists, dropped {} indexed nodes",
                scale_set_id,
                removed
            );
        } else {
            tracing::error!("{}", err);
        }
        err
    }
}

impl<C: ComputeApi> Refresh for VmCollectionRefresher<C> {
    type Output = VmCollection;

    async fn refresh(&self, scale_set_id: &str) -> Result<VmCollection, CacheError> {
        let vms = self
            .client
            .list_flex_vms_without_instance_view(scale_set_id)
            .await
            .map_err(|err| {
                self.listing_failed("list_flex_vms_without_instance_view", scale_set_id, err)
            })?;
        let views = self
            .client
            .list_flex_vms_with_only_instance_view(scale_set_id)
            .await
            .map_err(|err| {
                self.listing_failed("list_flex_vms_with_only_instance_view", scale_set_id, err)
            })?;

        let mut collection = VmCollection::new();
        for mut vm in vms {
            // owner is always the key we listed by, whatever casing ARM echoes back
            vm.scale_set_id = Some(scale_set_id.to_string());
            let name = vm.name.clone();
            if !collection.insert(vm) {
                tracing::warn!("VM {} in {} has no computer name, skipping", name, scale_set_id);
            }
        }
        let merged = collection.merge_instance_views(views);

        let gone = self.index.retain_scale_set(scale_set_id, |node| collection.contains(node));
        if gone > 0 {
            tracing::info!("Dropped {} vanished nodes of {} from the index", gone, scale_set_id);
        }
        for vm in collection.vms() {
            self.index.absorb(vm);
        }
        tracing::debug!(
            "Listed {} VMs ({} instance views) in {}",
            collection.len(),
            merged,
            scale_set_id
        );
        Ok(collection)
    }
}

/// Lists the flexible scale sets of every configured resource group.
///
/// After a successful listing, VM collections and index entries of scale
/// sets that are gone are pruned.
pub struct ScaleSetRefresher<C: ComputeApi> {
    client: Arc<C>,
    resource_groups: Vec<String>,
    vms: Arc<TimedCache<VmCollectionRefresher<C>>>,
    index: Arc<NodeIndex>,
}

impl<C: ComputeApi> ScaleSetRefresher<C> {
    pub fn new(
        client: Arc<C>,
        resource_groups: Vec<String>,
        vms: Arc<TimedCache<VmCollectionRefresher<C>>>,
        index: Arc<NodeIndex>,
    ) -> Self {
        Self {
            client,
            resource_groups,
            vms,
            index,
        }
    }

    /// Waits out VM refreshes in flight for vanished scale sets before their
    /// index entries are dropped.
    async fn prune(&self, collection: &ScaleSetCollection) {
        for scale_set_id in self.vms.keys() {
            if collection.contains(&scale_set_id) {
                continue;
            }
            self.vms.delete(&scale_set_id).await;
            let removed = self.index.remove_scale_set(&scale_set_id);
            tracing::info!(
                "Scale set {} disappeared, pruned its VMs and {} indexed nodes",
                scale_set_id,
                removed
            );
        }
    }
}

impl<C: ComputeApi> Refresh for ScaleSetRefresher<C> {
    type Output = ScaleSetCollection;

    async fn refresh(&self, _key: &str) -> Result<ScaleSetCollection, CacheError> {
        let mut collection = ScaleSetCollection::new();
        for resource_group in &self.resource_groups {
            let scale_sets = match self.client.list_scale_sets(resource_group).await {
                Ok(scale_sets) => scale_sets,
                Err(err) if err.is_not_found() => {
                    tracing::warn!("Resource group {} not found, skipping", resource_group);
                    continue;
                }
                Err(err) => {
                    let err = CacheError::from_api("list_scale_sets", resource_group, err);
                    tracing::error!("{}", err);
                    return Err(err);
                }
            };

            for scale_set in scale_sets {
                if scale_set.id.is_empty() {
                    tracing::warn!(
                        "Scale set {} in {} has no id, skipping",
                        scale_set.name,
                        resource_group
                    );
                    continue;
                }
                collection.insert(scale_set);
            }
        }

        self.prune(&collection).await;
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use vmssflex_api::types::{InstanceView, OrchestrationMode, ScaleSet, VirtualMachine};

    #[derive(Default)]
    struct FakeCompute {
        scale_sets: Mutex<HashMap<String, Result<Vec<ScaleSet>, u16>>>,
        vms: Mutex<HashMap<String, Vec<VirtualMachine>>>,
        views: Mutex<HashMap<String, Vec<VirtualMachine>>>,
    }

    fn api_error(status: u16) -> vmssflex_api::Error {
        match status {
            404 => vmssflex_api::Error::NotFound,
            _ => vmssflex_api::Error::HttpStatus {
                status,
                body: String::new(),
            },
        }
    }

    impl ComputeApi for FakeCompute {
        async fn list_scale_sets(&self, rg: &str) -> Result<Vec<ScaleSet>, vmssflex_api::Error> {
            match self.scale_sets.lock().unwrap().get(rg) {
                Some(Ok(list)) => Ok(list.clone()),
                Some(Err(status)) => Err(api_error(*status)),
                None => Err(vmssflex_api::Error::NotFound),
            }
        }

        async fn list_flex_vms_without_instance_view(
            &self,
            id: &str,
        ) -> Result<Vec<VirtualMachine>, vmssflex_api::Error> {
            self.vms
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(vmssflex_api::Error::NotFound)
        }

        async fn list_flex_vms_with_only_instance_view(
            &self,
            id: &str,
        ) -> Result<Vec<VirtualMachine>, vmssflex_api::Error> {
            Ok(self.views.lock().unwrap().get(id).cloned().unwrap_or_default())
        }
    }

    fn scale_set(id: &str, mode: OrchestrationMode) -> ScaleSet {
        ScaleSet {
            id: id.to_string(),
            name: id.rsplit('/').next().unwrap().to_string(),
            orchestration_mode: mode,
            computer_name_prefix: None,
        }
    }

    fn vm(name: &str, computer_name: Option<&str>) -> VirtualMachine {
        VirtualMachine {
            name: name.to_string(),
            computer_name: computer_name.map(str::to_string),
            ..Default::default()
        }
    }

    fn vm_refresher(
        client: &Arc<FakeCompute>,
    ) -> (Arc<NodeIndex>, VmCollectionRefresher<FakeCompute>) {
        let index = Arc::new(NodeIndex::new());
        let refresher = VmCollectionRefresher::new(Arc::clone(client), Arc::clone(&index));
        (index, refresher)
    }

    #[tokio::test]
    async fn vm_refresh_merges_views_and_indexes() {
        let client = Arc::new(FakeCompute::default());
        client.vms.lock().unwrap().insert(
            "/ss/a".into(),
            vec![vm("vm1", Some("Node1")), vm("vm2", Some("node2")), vm("vm3", None)],
        );
        client.views.lock().unwrap().insert(
            "/ss/a".into(),
            vec![VirtualMachine {
                name: "vm1".into(),
                instance_view: Some(InstanceView {
                    platform_fault_domain: Some(2),
                    statuses: Vec::new(),
                }),
                ..Default::default()
            }],
        );
        let (index, refresher) = vm_refresher(&client);

        let collection = refresher.refresh("/ss/a").await.unwrap();
        assert_eq!(collection.len(), 2);
        let node1 = collection.get("node1").unwrap();
        assert_eq!(node1.scale_set_id.as_deref(), Some("/ss/a"));
        assert_eq!(
            node1.instance_view.as_ref().unwrap().platform_fault_domain,
            Some(2)
        );
        assert_eq!(index.scale_set_for_node("node2").as_deref(), Some("/ss/a"));
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn vm_refresh_drops_vanished_members_from_index() {
        let client = Arc::new(FakeCompute::default());
        client.vms.lock().unwrap().insert(
            "/ss/a".into(),
            vec![vm("vm1", Some("node1")), vm("vm2", Some("node2"))],
        );
        let (index, refresher) = vm_refresher(&client);
        refresher.refresh("/ss/a").await.unwrap();
        assert_eq!(index.len(), 2);

        client
            .vms
            .lock()
            .unwrap()
            .insert("/ss/a".into(), vec![vm("vm2", Some("node2"))]);
        refresher.refresh("/ss/a").await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.scale_set_for_node("node1"), None);
        assert_eq!(index.node_name_for_vm("vm1"), None);
        assert_eq!(index.scale_set_for_node("node2").as_deref(), Some("/ss/a"));
    }

    #[tokio::test]
    async fn vm_refresh_not_found_purges_index() {
        let client = Arc::new(FakeCompute::default());
        client
            .vms
            .lock()
            .unwrap()
            .insert("/ss/a".into(), vec![vm("vm1", Some("node1"))]);
        let (index, refresher) = vm_refresher(&client);
        refresher.refresh("/ss/a").await.unwrap();
        assert_eq!(index.len(), 1);

        client.vms.lock().unwrap().clear();
        let err = refresher.refresh("/ss/a").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(index.is_empty());
    }

    fn scale_set_refresher(
        client: &Arc<FakeCompute>,
        groups: &[&str],
    ) -> (
        Arc<TimedCache<VmCollectionRefresher<FakeCompute>>>,
        Arc<NodeIndex>,
        ScaleSetRefresher<FakeCompute>,
    ) {
        let (index, vm_refresher) = vm_refresher(client);
        let vms = Arc::new(TimedCache::new(vm_refresher, Duration::from_secs(60), false));
        let refresher = ScaleSetRefresher::new(
            Arc::clone(client),
            groups.iter().map(|g| g.to_string()).collect(),
            Arc::clone(&vms),
            Arc::clone(&index),
        );
        (vms, index, refresher)
    }

    #[tokio::test]
    async fn scale_set_refresh_filters_and_skips_missing_groups() {
        let client = Arc::new(FakeCompute::default());
        client.scale_sets.lock().unwrap().insert(
            "rg2".into(),
            Ok(vec![
                scale_set("/rg2/flex", OrchestrationMode::Flexible),
                scale_set("/rg2/uniform", OrchestrationMode::Uniform),
                scale_set("", OrchestrationMode::Flexible),
            ]),
        );
        let (_vms, _index, refresher) = scale_set_refresher(&client, &["rg1", "rg2"]);

        let collection = refresher.refresh("all").await.unwrap();
        assert_eq!(collection.ids().collect::<Vec<_>>(), vec!["/rg2/flex"]);
    }

    #[tokio::test]
    async fn scale_set_refresh_aborts_on_other_errors() {
        let client = Arc::new(FakeCompute::default());
        client.scale_sets.lock().unwrap().insert("rg1".into(), Err(500));
        let (_vms, _index, refresher) = scale_set_refresher(&client, &["rg1"]);

        let err = refresher.refresh("all").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn scale_set_refresh_prunes_vanished_scale_sets() {
        let client = Arc::new(FakeCompute::default());
        client.scale_sets.lock().unwrap().insert(
            "rg".into(),
            Ok(vec![
                scale_set("/rg/a", OrchestrationMode::Flexible),
                scale_set("/rg/b", OrchestrationMode::Flexible),
            ]),
        );
        client
            .vms
            .lock()
            .unwrap()
            .insert("/rg/a".into(), vec![vm("vm1", Some("node1"))]);
        client
            .vms
            .lock()
            .unwrap()
            .insert("/rg/b".into(), vec![vm("vm2", Some("node2"))]);
        let (vms, index, refresher) = scale_set_refresher(&client, &["rg"]);

        refresher.refresh("all").await.unwrap();
        vms.get("/rg/a", crate::cache::ReadPolicy::Default).await.unwrap();
        vms.get("/rg/b", crate::cache::ReadPolicy::Default).await.unwrap();
        assert_eq!(index.len(), 2);

        client.scale_sets.lock().unwrap().insert(
            "rg".into(),
            Ok(vec![scale_set("/rg/a", OrchestrationMode::Flexible)]),
        );
        refresher.refresh("all").await.unwrap();
        assert_eq!(vms.keys(), vec!["/rg/a".to_string()]);
        assert_eq!(index.scale_set_for_node("node2"), None);
        assert_eq!(index.len(), 1);
    }
}
