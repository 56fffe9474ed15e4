//! Resolution of Kubernetes node names to flexible scale set VMs.

use std::sync::Arc;

use vmssflex_api::types::{ScaleSet, VirtualMachine};
use vmssflex_api::ComputeApi;

use crate::cache::{LockMap, ReadPolicy, TimedCache};
use crate::collections::ScaleSetCollection;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::index::NodeIndex;
use crate::refresh::{ScaleSetRefresher, VmCollectionRefresher};

/// Key of the single scale set collection entry.
pub const ALL_SCALE_SETS_KEY: &str = "all-flex-scale-sets";
/// Serializes slow-path node lookups.
pub const NODE_LOOKUP_LOCK_KEY: &str = "node-scale-set-lookup";

/// Caches flexible scale sets and their VMs, and answers which VM and scale
/// set back a given node.
///
/// Lookups are served from memory while fresh. Misses fall back to a forced
/// refresh once before reporting [`CacheError::NotFound`].
pub struct FlexScaleSetCache<C: ComputeApi> {
    scale_sets: TimedCache<ScaleSetRefresher<C>>,
    vms: Arc<TimedCache<VmCollectionRefresher<C>>>,
    index: Arc<NodeIndex>,
    locks: LockMap,
    disabled: bool,
}

impl<C: ComputeApi> FlexScaleSetCache<C> {
    pub fn new(client: Arc<C>, config: CacheConfig) -> Self {
        let config = config.normalized();
        let disabled = config.disable_api_call_cache;
        let index = Arc::new(NodeIndex::new());
        let vms = Arc::new(TimedCache::new(
            VmCollectionRefresher::new(Arc::clone(&client), Arc::clone(&index)),
            config.vm_ttl,
            disabled,
        ));
        let scale_sets = TimedCache::new(
            ScaleSetRefresher::new(
                client,
                config.resource_groups,
                Arc::clone(&vms),
                Arc::clone(&index),
            ),
            config.scale_set_ttl,
            disabled,
        );
        Self {
            scale_sets,
            vms,
            index,
            locks: LockMap::new(),
            disabled,
        }
    }

    pub fn index(&self) -> &NodeIndex {
        &self.index
    }

    /// The id of the flexible scale set that owns `node_name`.
    pub async fn resolve_node_to_scale_set_id(
        &self,
        node_name: &str,
    ) -> Result<String, CacheError> {
        let node_name = node_name.to_ascii_lowercase();
        if let Some(id) = self.index.scale_set_for_node(&node_name) {
            return Ok(id);
        }

        let _guard = self.locks.lock_entry(NODE_LOOKUP_LOCK_KEY).await;
        // someone else may have resolved it while we waited
        if let Some(id) = self.index.scale_set_for_node(&node_name) {
            return Ok(id);
        }

        let scale_sets = self.scale_sets.get(ALL_SCALE_SETS_KEY, ReadPolicy::Default).await?;
        let (found, prefix_matched) = self.probe(&scale_sets, &node_name).await?;
        if let Some(id) = found {
            return Ok(id);
        }
        if prefix_matched {
            return Err(CacheError::NotFound);
        }

        tracing::debug!(
            "Node {} not found in any known scale set, refreshing scale sets",
            node_name
        );
        let scale_sets = self
            .scale_sets
            .get(ALL_SCALE_SETS_KEY, ReadPolicy::ForceRefresh)
            .await?;
        let (found, _) = self.probe(&scale_sets, &node_name).await?;
        found.ok_or(CacheError::NotFound)
    }

    /// Force-refreshes the VMs of each candidate scale set, best guesses
    /// first, until one of them contains `node_name`.
    ///
    /// Also reports whether any candidate matched the node by name prefix.
    async fn probe(
        &self,
        scale_sets: &ScaleSetCollection,
        node_name: &str,
    ) -> Result<(Option<String>, bool), CacheError> {
        let candidates = scale_sets.rank_for_node(node_name);
        let prefix_matched = candidates.iter().any(|c| c.prefix_match);
        for candidate in candidates {
            let listed = self.vms.get(&candidate.id, ReadPolicy::ForceRefresh).await;
            match listed {
                Ok(vms) if vms.contains(node_name) => {
                    return Ok((Some(candidate.id), prefix_matched));
                }
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok((None, prefix_matched))
    }

    /// Owner of `node_name` using cached data only.
    async fn cached_scale_set_for_node(
        &self,
        node_name: &str,
        policy: ReadPolicy,
    ) -> Result<String, CacheError> {
        if let Some(id) = self.index.scale_set_for_node(node_name) {
            return Ok(id);
        }
        if self.disabled {
            return Err(CacheError::NotFound);
        }
        for scale_set_id in self.vms.keys() {
            let cached = self.vms.get(&scale_set_id, policy).await;
            match cached {
                Ok(vms) if vms.contains(node_name) => return Ok(scale_set_id),
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Err(CacheError::NotFound)
    }

    async fn owner_of(&self, node_name: &str, policy: ReadPolicy) -> Result<String, CacheError> {
        match policy {
            ReadPolicy::Unsafe | ReadPolicy::NoRefresh => {
                self.cached_scale_set_for_node(node_name, policy).await
            }
            ReadPolicy::Default | ReadPolicy::ForceRefresh => {
                self.resolve_node_to_scale_set_id(node_name).await
            }
        }
    }

    /// The VM backing `node_name`.
    ///
    /// With [`ReadPolicy::Unsafe`] or [`ReadPolicy::NoRefresh`] no remote call
    /// is made.
    pub async fn resolve_vm_by_node_name(
        &self,
        node_name: &str,
        policy: ReadPolicy,
    ) -> Result<VirtualMachine, CacheError> {
        let node_name = node_name.to_ascii_lowercase();
        let scale_set_id = self.owner_of(&node_name, policy).await?;
        let vms = self.vms.get(&scale_set_id, policy).await?;
        vms.get(&node_name).cloned().ok_or(CacheError::NotFound)
    }

    pub async fn resolve_scale_set_by_id(
        &self,
        scale_set_id: &str,
        policy: ReadPolicy,
    ) -> Result<ScaleSet, CacheError> {
        self.find_scale_set(scale_set_id, policy, |scale_sets| scale_sets.get(scale_set_id)).await
    }

    /// The scale set whose id ends with `/name`, ignoring case.
    pub async fn resolve_scale_set_by_name(
        &self,
        name: &str,
        policy: ReadPolicy,
    ) -> Result<ScaleSet, CacheError> {
        self.find_scale_set(name, policy, |scale_sets| scale_sets.find_by_name(name)).await
    }

    pub async fn resolve_scale_set_id_by_name(
        &self,
        name: &str,
        policy: ReadPolicy,
    ) -> Result<String, CacheError> {
        self.resolve_scale_set_by_name(name, policy).await.map(|ss| ss.id)
    }

    /// Looks a scale set up in the collection read under `policy`. A miss on a
    /// [`ReadPolicy::Default`] read forces one refresh before giving up.
    async fn find_scale_set<F>(
        &self,
        wanted: &str,
        policy: ReadPolicy,
        find: F,
    ) -> Result<ScaleSet, CacheError>
    where
        F: Fn(&ScaleSetCollection) -> Option<&ScaleSet>,
    {
        let scale_sets = self.scale_sets.get(ALL_SCALE_SETS_KEY, policy).await?;
        if let Some(scale_set) = find(&scale_sets) {
            return Ok(scale_set.clone());
        }
        // a forced read just refreshed, cache-only reads never do
        if policy != ReadPolicy::Default {
            return Err(CacheError::NotFound);
        }

        tracing::debug!("Scale set {} not cached, refreshing scale sets", wanted);
        let scale_sets = self
            .scale_sets
            .get(ALL_SCALE_SETS_KEY, ReadPolicy::ForceRefresh)
            .await?;
        find(&scale_sets).cloned().ok_or(CacheError::NotFound)
    }

    /// The scale set that owns `node_name`.
    pub async fn resolve_scale_set_by_node_name(
        &self,
        node_name: &str,
        policy: ReadPolicy,
    ) -> Result<ScaleSet, CacheError> {
        let node_name = node_name.to_ascii_lowercase();
        let scale_set_id = self.owner_of(&node_name, policy).await?;
        self.resolve_scale_set_by_id(&scale_set_id, policy).await
    }

    /// The node name of the VM called `vm_name`.
    pub async fn resolve_node_name_by_vm_name(&self, vm_name: &str) -> Result<String, CacheError> {
        if let Some(node_name) = self.index.node_name_for_vm(vm_name) {
            return Ok(node_name);
        }

        let _guard = self.locks.lock_entry(NODE_LOOKUP_LOCK_KEY).await;
        match self.load_all_vms(vm_name, ReadPolicy::Default).await {
            Err(err) if err.is_not_found() => {
                tracing::debug!("VM {} not cached, refreshing all VMs", vm_name);
                self.load_all_vms(vm_name, ReadPolicy::ForceRefresh).await
            }
            result => result,
        }
    }

    /// Loads the VMs of every known scale set under `policy` and looks
    /// `vm_name` up in the index afterwards.
    async fn load_all_vms(&self, vm_name: &str, policy: ReadPolicy) -> Result<String, CacheError> {
        let scale_sets = self.scale_sets.get(ALL_SCALE_SETS_KEY, policy).await?;
        for scale_set_id in scale_sets.ids() {
            match self.vms.get(scale_set_id, policy).await {
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        self.index
            .node_name_for_vm(vm_name)
            .ok_or(CacheError::NotFound)
    }

    /// Forgets `node_name` after its VM was deleted.
    ///
    /// Only cached data is consulted; an unknown node is not an error.
    pub async fn delete_cache_for_node(&self, node_name: &str) -> Result<(), CacheError> {
        if self.disabled {
            return Ok(());
        }
        let node_name = node_name.to_ascii_lowercase();
        let scale_set_id = match self
            .cached_scale_set_for_node(&node_name, ReadPolicy::Unsafe)
            .await
        {
            Ok(id) => id,
            Err(err) if err.is_not_found() => {
                tracing::debug!("Node {} is not cached, nothing to delete", node_name);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let guard = self.locks.lock_entry(&scale_set_id).await;
        self.vms
            .update_with(&scale_set_id, |vms| vms.without(&node_name))
            .await;
        self.index.remove_node(&node_name);
        self.locks.unlock_entry(guard);

        tracing::info!(
            "Deleted node {} of scale set {} from the cache",
            node_name,
            scale_set_id
        );
        Ok(())
    }

    /// Number of nodes currently in the index.
    pub fn indexed_node_count(&self) -> usize {
        self.index.len()
    }

    /// Number of cached VMs of `scale_set_id`, if its collection is cached.
    pub fn cached_vm_count(&self, scale_set_id: &str) -> Option<usize> {
        self.vms
            .store()
            .get_by_key(scale_set_id)
            .and_then(|entry| entry.data())
            .map(|vms| vms.len())
    }
}
