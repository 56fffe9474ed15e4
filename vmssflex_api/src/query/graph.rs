//! Resource graph (KQL) query text builders.

/// Finds the name of the VM whose OS computer name matches, within one resource group.
#[derive(Clone, Debug)]
pub struct ComputerNameQuery {
    pub resource_group: String,
    pub computer_name: String,
}

impl ComputerNameQuery {
    pub fn new(resource_group: &str, computer_name: &str) -> Self {
        Self {
            resource_group: resource_group.to_string(),
            computer_name: computer_name.to_string(),
        }
    }

    /// Renders the KQL text. Both values are string literals, so quotes and
    /// backslashes are escaped.
    pub fn to_kql(&self) -> String {
        format!(
            "Resources\n\
             | where type =~ 'Microsoft.Compute/virtualMachines'\n\
             | where properties['osProfile']['computerName'] =~ '{}'\n\
             | where resourceGroup =~ '{}'\n\
             | limit 2\n\
             | project name",
            escape_literal(&self.computer_name),
            escape_literal(&self.resource_group),
        )
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
