//! Virtual machine descriptor and its separately fetched instance view.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The fields of a VM needed to resolve node identities.
///
/// ARM returns the static model and the instance view from two different
/// listing calls; [`VirtualMachine::instance_view`] is `None` until merged.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(from = "RawVirtualMachine")]
pub struct VirtualMachine {
    pub name: String,
    pub id: String,
    /// OS-level host name. Kubernetes uses it, lower-cased, as the node name.
    pub computer_name: Option<String>,
    /// Identifier of the owning scale set. `None` for standalone VMs.
    pub scale_set_id: Option<String>,
    pub provisioning_state: Option<String>,
    pub instance_view: Option<InstanceView>,
}

impl VirtualMachine {
    /// The Kubernetes node name of this VM, if it has a computer name.
    pub fn node_name(&self) -> Option<String> {
        self.computer_name
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase)
    }
}

/// Runtime status of a VM.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub platform_fault_domain: Option<i32>,
    #[serde(default)]
    pub statuses: Vec<InstanceViewStatus>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceViewStatus {
    pub code: Option<String>,
    pub level: Option<String>,
    pub display_status: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl InstanceView {
    /// The power state, e.g. `running` for status code `PowerState/running`.
    pub fn power_state(&self) -> Option<&str> {
        self.statuses
            .iter()
            .filter_map(|s| s.code.as_deref())
            .find_map(|code| code.strip_prefix("PowerState/"))
    }
}

#[derive(Deserialize)]
struct RawVirtualMachine {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    properties: Option<RawVmProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVmProperties {
    os_profile: Option<RawOsProfile>,
    virtual_machine_scale_set: Option<RawSubResource>,
    provisioning_state: Option<String>,
    instance_view: Option<InstanceView>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOsProfile {
    computer_name: Option<String>,
}

#[derive(Deserialize)]
struct RawSubResource {
    id: Option<String>,
}

impl From<RawVirtualMachine> for VirtualMachine {
    fn from(raw: RawVirtualMachine) -> Self {
        let (computer_name, scale_set_id, provisioning_state, instance_view) = match raw.properties
        {
            Some(p) => (
                p.os_profile.and_then(|o| o.computer_name),
                p.virtual_machine_scale_set.and_then(|s| s.id),
                p.provisioning_state,
                p.instance_view,
            ),
            None => (None, None, None, None),
        };
        Self {
            name: raw.name.unwrap_or_default(),
            id: raw.id.unwrap_or_default(),
            computer_name,
            scale_set_id,
            provisioning_state,
            instance_view,
        }
    }
}
