use url::Url;

use super::common::Query;

/// Lists the VMs of one flexible scale set across the subscription.
///
/// With `status_only` ARM returns only the instance view of each VM.
#[derive(Clone, Debug)]
pub struct FlexVmListQuery {
    pub scale_set_id: String,
    pub status_only: bool,
}

impl FlexVmListQuery {
    pub fn new(scale_set_id: &str) -> Self {
        Self {
            scale_set_id: scale_set_id.to_string(),
            status_only: false,
        }
    }

    pub fn with_status_only(mut self) -> Self {
        self.status_only = true;
        self
    }

    fn filter(&self) -> String {
        format!(
            "'virtualMachineScaleSet/id' eq '{}'",
            self.scale_set_id.replace('\'', "''")
        )
    }
}

impl Query for FlexVmListQuery {
    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut().append_pair("$filter", &self.filter());
        if self.status_only {
            url.query_pairs_mut().append_pair("statusOnly", "true");
        }
        url
    }
}
