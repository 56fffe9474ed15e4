//! Shared query infrastructure: the [`Query`] trait and ARM API versions.

use url::Url;

/// ARM API versions used by the listing calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiVersion {
    Compute,
    ResourceGraph,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "2022-08-01",
            Self::ResourceGraph => "2021-03-01",
        }
    }
}

/// Trait implemented by query builders that serialize into URL parameters.
pub trait Query {
    /// Appends this query's parameters to the given URL, returning the modified URL.
    fn add_to_url(&self, url: &Url) -> Url;
}

/// Appends `api-version` unless the URL already carries one (e.g. a `nextLink`).
pub(crate) fn with_api_version(url: &Url, version: ApiVersion) -> Url {
    let mut url = url.clone();
    if !url.query_pairs().any(|(k, _)| k == "api-version") {
        url.query_pairs_mut()
            .append_pair("api-version", version.as_str());
    }
    url
}
