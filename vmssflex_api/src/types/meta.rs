//! Response envelopes shared by ARM list calls and resource graph queries.

use serde::Deserialize;

/// One page of an ARM list operation.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    /// Absolute URL of the next page, absent on the last one.
    pub next_link: Option<String>,
}

/// Result of a resource graph query (`objectArray` result format).
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Total number of records matching the query.
    pub total_records: Option<i64>,
    /// Number of records returned in this response.
    pub count: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl QueryResponse {
    /// Returns the result rows when the data is in `objectArray` format.
    pub fn rows(&self) -> &[serde_json::Value] {
        self.data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}
