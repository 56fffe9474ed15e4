//! Secondary lookups between VM names, node names and owning scale sets.

use std::collections::HashMap;
use std::sync::RwLock;

use vmssflex_api::types::VirtualMachine;

#[derive(Default)]
struct Maps {
    node_by_vm: HashMap<String, String>,
    vm_by_node: HashMap<String, String>,
    scale_set_by_node: HashMap<String, String>,
}

impl Maps {
    fn remove_node(&mut self, node_name: &str) -> Option<String> {
        self.scale_set_by_node.remove(node_name);
        let vm_name = self.vm_by_node.remove(node_name)?;
        if self.node_by_vm.get(&vm_name).map(String::as_str) == Some(node_name) {
            self.node_by_vm.remove(&vm_name);
        }
        Some(vm_name)
    }
}

/// Node name ↔ VM name and node name → scale set id.
///
/// The three maps sit behind one lock, so an absorb or a removal is seen
/// by readers either entirely or not at all.
#[derive(Default)]
pub struct NodeIndex {
    maps: RwLock<Maps>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `vm` in all three maps. Returns `false` when it has no computer name.
    ///
    /// Stale pairings are dropped: if the node used to belong to another VM, or
    /// the VM used to carry another node name, the old entries go away.
    pub fn absorb(&self, vm: &VirtualMachine) -> bool {
        let Some(node_name) = vm.node_name() else {
            return false;
        };
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());

        if let Some(old_vm) = maps.vm_by_node.get(&node_name).cloned() {
            if old_vm != vm.name {
                maps.node_by_vm.remove(&old_vm);
            }
        }
        if let Some(old_node) = maps.node_by_vm.get(&vm.name).cloned() {
            if old_node != node_name {
                maps.remove_node(&old_node);
            }
        }

        maps.node_by_vm.insert(vm.name.clone(), node_name.clone());
        maps.vm_by_node.insert(node_name.clone(), vm.name.clone());
        match vm.scale_set_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                maps.scale_set_by_node.insert(node_name, id.to_string());
            }
            None => {
                maps.scale_set_by_node.remove(&node_name);
            }
        }
        true
    }

    /// Forgets `node_name`. Returns the VM name it was mapped to.
    pub fn remove_node(&self, node_name: &str) -> Option<String> {
        self.maps
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_node(node_name)
    }

    /// Forgets every node owned by `scale_set_id`. Returns how many were removed.
    pub fn remove_scale_set(&self, scale_set_id: &str) -> usize {
        self.retain_scale_set(scale_set_id, |_| false)
    }

    /// Forgets the nodes owned by `scale_set_id` for which `keep` is false.
    /// Returns how many were removed.
    pub fn retain_scale_set(&self, scale_set_id: &str, keep: impl Fn(&str) -> bool) -> usize {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        let owned: Vec<String> = maps
            .scale_set_by_node
            .iter()
            .filter(|(node, id)| id.eq_ignore_ascii_case(scale_set_id) && !keep(node.as_str()))
            .map(|(node, _)| node.clone())
            .collect();
        for node in &owned {
            maps.remove_node(node);
        }
        owned.len()
    }

    pub fn node_name_for_vm(&self, vm_name: &str) -> Option<String> {
        self.read(|maps| maps.node_by_vm.get(vm_name).cloned())
    }

    pub fn vm_name_for_node(&self, node_name: &str) -> Option<String> {
        self.read(|maps| maps.vm_by_node.get(node_name).cloned())
    }

    pub fn scale_set_for_node(&self, node_name: &str) -> Option<String> {
        self.read(|maps| maps.scale_set_by_node.get(node_name).cloned())
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.read(|maps| maps.vm_by_node.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<T>(&self, f: impl FnOnce(&Maps) -> T) -> T {
        f(&self.maps.read().unwrap_or_else(|e| e.into_inner()))
    }
}
