//! Virtual machine scale set descriptor.

use serde::Deserialize;

/// How a scale set orchestrates its members. Only [`OrchestrationMode::Flexible`]
/// scale sets own independently managed VMs.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestrationMode {
    #[default]
    Uniform,
    Flexible,
    #[serde(other)]
    Unknown,
}

/// The fields of a scale set needed to resolve node identities.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(from = "RawScaleSet")]
pub struct ScaleSet {
    /// Full ARM resource identifier. Empty when ARM omitted it.
    pub id: String,
    pub name: String,
    pub orchestration_mode: OrchestrationMode,
    /// Prefix of the computer names of VMs created by this scale set.
    pub computer_name_prefix: Option<String>,
}

impl ScaleSet {
    pub fn is_flexible(&self) -> bool {
        self.orchestration_mode == OrchestrationMode::Flexible
    }

    /// The prefix member computer names start with, falling back to the scale set name.
    pub fn name_prefix(&self) -> &str {
        self.computer_name_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Deserialize)]
struct RawScaleSet {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    properties: Option<RawScaleSetProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScaleSetProperties {
    orchestration_mode: Option<OrchestrationMode>,
    virtual_machine_profile: Option<RawVmProfile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVmProfile {
    os_profile: Option<RawOsProfile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOsProfile {
    computer_name_prefix: Option<String>,
}

impl From<RawScaleSet> for ScaleSet {
    fn from(raw: RawScaleSet) -> Self {
        let properties = raw.properties;
        let orchestration_mode = properties
            .as_ref()
            .and_then(|p| p.orchestration_mode)
            .unwrap_or_default();
        let computer_name_prefix = properties
            .and_then(|p| p.virtual_machine_profile)
            .and_then(|p| p.os_profile)
            .and_then(|p| p.computer_name_prefix);
        Self {
            id: raw.id.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            orchestration_mode,
            computer_name_prefix,
        }
    }
}
