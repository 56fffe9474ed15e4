//! Typed snapshots stored in the two timed caches.

use std::collections::{BTreeMap, HashMap};

use vmssflex_api::types::{ScaleSet, VirtualMachine};

/// Length of the instance suffix flexible scale sets append to the computer name prefix.
const INSTANCE_SUFFIX_LEN: usize = 6;

/// Flexible scale sets keyed by resource id, iterated in id order.
#[derive(Debug, Default, Clone)]
pub struct ScaleSetCollection {
    by_id: BTreeMap<String, ScaleSet>,
}

/// A scale set that may own a node, in probing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    /// The node name starts with this scale set's computer name prefix.
    pub prefix_match: bool,
}

impl ScaleSetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scale set. Returns `false` (and stores nothing) for scale sets
    /// without an id or that are not flexible.
    pub fn insert(&mut self, scale_set: ScaleSet) -> bool {
        if scale_set.id.is_empty() || !scale_set.is_flexible() {
            return false;
        }
        self.by_id.insert(scale_set.id.clone(), scale_set);
        true
    }

    pub fn get(&self, id: &str) -> Option<&ScaleSet> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// First scale set (in id order) whose id ends with `/name`, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<&ScaleSet> {
        self.by_id
            .iter()
            .find(|(id, _)| last_segment(id).is_some_and(|s| s.eq_ignore_ascii_case(name)))
            .map(|(_, ss)| ss)
    }

    /// Orders all scale sets for probing ownership of `node_name`.
    ///
    /// Scale sets whose computer name prefix matches the node name come first;
    /// ties keep id order.
    pub fn rank_for_node(&self, node_name: &str) -> Vec<Candidate> {
        let hint = node_name_prefix(node_name);
        let mut candidates: Vec<Candidate> = self
            .by_id
            .iter()
            .map(|(id, ss)| Candidate {
                id: id.clone(),
                prefix_match: hint.is_some_and(|h| ss.name_prefix().eq_ignore_ascii_case(h)),
            })
            .collect();
        candidates.sort_by_key(|c| !c.prefix_match);
        candidates
    }
}

impl FromIterator<ScaleSet> for ScaleSetCollection {
    fn from_iter<I: IntoIterator<Item = ScaleSet>>(iter: I) -> Self {
        let mut collection = Self::new();
        for scale_set in iter {
            collection.insert(scale_set);
        }
        collection
    }
}

/// VMs of one scale set keyed by node name.
#[derive(Debug, Default, Clone)]
pub struct VmCollection {
    by_node: HashMap<String, VirtualMachine>,
}

impl VmCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a VM under its node name. VMs without a computer name are skipped.
    pub fn insert(&mut self, vm: VirtualMachine) -> bool {
        match vm.node_name() {
            Some(node) => {
                self.by_node.insert(node, vm);
                true
            }
            None => false,
        }
    }

    /// Copies instance views onto the VMs with the same name.
    ///
    /// Views without a matching VM are dropped. Returns the number merged.
    pub fn merge_instance_views(&mut self, views: Vec<VirtualMachine>) -> usize {
        let node_by_vm_name: HashMap<String, String> = self
            .by_node
            .iter()
            .map(|(node, vm)| (vm.name.clone(), node.clone()))
            .collect();
        let mut merged = 0;
        for view in views {
            let Some(instance_view) = view.instance_view else {
                continue;
            };
            let Some(vm) = node_by_vm_name
                .get(&view.name)
                .and_then(|node| self.by_node.get_mut(node))
            else {
                continue;
            };
            vm.instance_view = Some(instance_view);
            merged += 1;
        }
        merged
    }

    pub fn get(&self, node_name: &str) -> Option<&VirtualMachine> {
        self.by_node.get(node_name)
    }

    pub fn contains(&self, node_name: &str) -> bool {
        self.by_node.contains_key(node_name)
    }

    /// A copy of this collection without `node_name`.
    pub fn without(&self, node_name: &str) -> Self {
        let mut copy = self.clone();
        copy.by_node.remove(node_name);
        copy
    }

    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.by_node.values()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.by_node.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

/// Trailing `/` segment of a resource id.
pub fn last_segment(id: &str) -> Option<&str> {
    id.rsplit('/').next().filter(|s| !s.is_empty())
}

/// The computer name prefix a flexible scale set would have used for `node_name`.
fn node_name_prefix(node_name: &str) -> Option<&str> {
    let end = node_name.len().checked_sub(INSTANCE_SUFFIX_LEN)?;
    if end == 0 || !node_name.is_char_boundary(end) {
        return None;
    }
    Some(&node_name[..end])
}
