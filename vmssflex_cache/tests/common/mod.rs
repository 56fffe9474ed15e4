//! In-memory stand-in for the ARM compute API.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use vmssflex_cache::types::{OrchestrationMode, ScaleSet, VirtualMachine};
use vmssflex_cache::vmssflex_api::Error;
use vmssflex_cache::ComputeApi;

pub const SUB: &str = "sub";

pub fn scale_set_id(resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachineScaleSets/{}",
        SUB, resource_group, name
    )
}

pub fn flex_scale_set(resource_group: &str, name: &str) -> ScaleSet {
    ScaleSet {
        id: scale_set_id(resource_group, name),
        name: name.to_string(),
        orchestration_mode: OrchestrationMode::Flexible,
        computer_name_prefix: Some(name.to_string()),
    }
}

pub fn vm(name: &str, computer_name: &str, scale_set_id: &str) -> VirtualMachine {
    VirtualMachine {
        name: name.to_string(),
        id: format!(
            "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/{}",
            SUB, name
        ),
        computer_name: Some(computer_name.to_string()),
        scale_set_id: Some(scale_set_id.to_string()),
        provisioning_state: Some("Succeeded".to_string()),
        instance_view: None,
    }
}

/// Resource groups and scale sets that are not registered answer with
/// `Error::NotFound`, the way ARM does for deleted resources.
#[derive(Default)]
pub struct FakeCompute {
    scale_sets: Mutex<HashMap<String, Vec<ScaleSet>>>,
    vms: Mutex<HashMap<String, Vec<VirtualMachine>>>,
    delay: Duration,
    pub list_scale_sets_calls: AtomicUsize,
    pub list_vms_calls: AtomicUsize,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn add_scale_set(&self, resource_group: &str, scale_set: ScaleSet) {
        self.vms
            .lock()
            .unwrap()
            .entry(scale_set.id.clone())
            .or_default();
        self.scale_sets
            .lock()
            .unwrap()
            .entry(resource_group.to_string())
            .or_default()
            .push(scale_set);
    }

    pub fn add_vm(&self, scale_set_id: &str, vm: VirtualMachine) {
        self.vms
            .lock()
            .unwrap()
            .entry(scale_set_id.to_string())
            .or_default()
            .push(vm);
    }

    pub fn remove_vm(&self, scale_set_id: &str, vm_name: &str) {
        if let Some(vms) = self.vms.lock().unwrap().get_mut(scale_set_id) {
            vms.retain(|vm| vm.name != vm_name);
        }
    }

    /// Makes VM listings of `scale_set_id` answer not found.
    pub fn delete_scale_set(&self, scale_set_id: &str) {
        self.vms.lock().unwrap().remove(scale_set_id);
        for scale_sets in self.scale_sets.lock().unwrap().values_mut() {
            scale_sets.retain(|ss| ss.id != scale_set_id);
        }
    }

    pub fn scale_set_list_count(&self) -> usize {
        self.list_scale_sets_calls.load(Ordering::SeqCst)
    }

    pub fn vm_list_count(&self) -> usize {
        self.list_vms_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn listed_vms(&self, scale_set_id: &str) -> Result<Vec<VirtualMachine>, Error> {
        self.vms
            .lock()
            .unwrap()
            .get(scale_set_id)
            .cloned()
            .ok_or(Error::NotFound)
    }
}

impl ComputeApi for FakeCompute {
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<ScaleSet>, Error> {
        self.list_scale_sets_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.scale_sets
            .lock()
            .unwrap()
            .get(resource_group)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_flex_vms_without_instance_view(
        &self,
        scale_set_id: &str,
    ) -> Result<Vec<VirtualMachine>, Error> {
        self.list_vms_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.listed_vms(scale_set_id)
    }

    async fn list_flex_vms_with_only_instance_view(
        &self,
        scale_set_id: &str,
    ) -> Result<Vec<VirtualMachine>, Error> {
        self.pause().await;
        Ok(self
            .listed_vms(scale_set_id)?
            .into_iter()
            .filter(|vm| vm.instance_view.is_some())
            .collect())
    }
}
