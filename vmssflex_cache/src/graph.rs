//! Single VM lookup by computer name through Azure Resource Graph.

use std::sync::{Arc, Mutex};

use tokio::time::Instant;
use vmssflex_api::{ComputerNameQuery, ResourceGraphApi};

use crate::error::CacheError;

const OPERATION: &str = "vm_name_by_computer_name";

/// Client-side admission control for read calls.
pub trait ReadLimiter: Send + Sync {
    /// Takes a token if one is available, without waiting.
    fn try_accept(&self) -> bool;
}

/// Admits every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unlimited;

impl ReadLimiter for Unlimited {
    fn try_accept(&self) -> bool {
        true
    }
}

/// Finds the VM name behind a computer name without listing whole scale sets.
pub struct ComputerNameLookup<G, L = Unlimited> {
    graph: Arc<G>,
    subscription_id: String,
    limiter: L,
    /// Set when the service throttled us; calls before it fail fast.
    retry_after: Mutex<Option<Instant>>,
}

impl<G: ResourceGraphApi> ComputerNameLookup<G> {
    pub fn new(graph: Arc<G>, subscription_id: &str) -> Self {
        Self::with_limiter(graph, subscription_id, Unlimited)
    }
}

impl<G: ResourceGraphApi, L: ReadLimiter> ComputerNameLookup<G, L> {
    pub fn with_limiter(graph: Arc<G>, subscription_id: &str, limiter: L) -> Self {
        Self {
            graph,
            subscription_id: subscription_id.to_string(),
            limiter,
            retry_after: Mutex::new(None),
        }
    }

    fn throttled(key: &str, retry_after: Option<std::time::Duration>) -> CacheError {
        CacheError::Transient {
            operation: OPERATION,
            key: key.to_string(),
            source: vmssflex_api::Error::Throttled { retry_after },
        }
    }

    /// Time left before the service accepts calls again.
    fn remaining_backoff(&self) -> Option<std::time::Duration> {
        let mut deadline = self.retry_after.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match *deadline {
            Some(at) if at > now => Some(at - now),
            Some(_) => {
                *deadline = None;
                None
            }
            None => None,
        }
    }

    fn record_retry_after(&self, err: &vmssflex_api::Error) {
        if let Some(delay) = err.retry_after() {
            *self.retry_after.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(Instant::now() + delay);
        }
    }

    /// The name of the VM in `resource_group` whose computer name is `computer_name`.
    pub async fn vm_name_by_computer_name(
        &self,
        resource_group: &str,
        computer_name: &str,
    ) -> Result<String, CacheError> {
        let key = format!("{}/{}", resource_group, computer_name);
        if !self.limiter.try_accept() {
            tracing::warn!("Read rate limit reached, not querying {}", key);
            return Err(Self::throttled(&key, None));
        }
        if let Some(remaining) = self.remaining_backoff() {
            tracing::warn!(
                "Resource graph throttled for another {:?}, not querying {}",
                remaining,
                key
            );
            return Err(Self::throttled(&key, Some(remaining)));
        }

        let query = ComputerNameQuery::new(resource_group, computer_name).to_kql();
        let response = match self.graph.send_query(&self.subscription_id, &query).await {
            Ok(response) => response,
            Err(err) => {
                self.record_retry_after(&err);
                let err = CacheError::from_api(OPERATION, &key, err);
                tracing::error!("{}", err);
                return Err(err);
            }
        };

        match response.rows() {
            [] => Err(CacheError::NotFound),
            [row] => row
                .get("name")
                .and_then(|name| name.as_str())
                .map(str::to_string)
                .ok_or_else(|| CacheError::Fatal {
                    operation: OPERATION,
                    key,
                    reason: "result row has no name".to_string(),
                }),
            _ => Err(CacheError::MultipleMatches {
                computer_name: computer_name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use vmssflex_api::types::QueryResponse;

    struct FakeGraph {
        calls: AtomicUsize,
        throttle: AtomicBool,
        rows: serde_json::Value,
        last_query: Mutex<String>,
    }

    impl FakeGraph {
        fn returning(rows: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                throttle: AtomicBool::new(false),
                rows,
                last_query: Mutex::new(String::new()),
            })
        }
    }

    impl ResourceGraphApi for FakeGraph {
        async fn send_query(
            &self,
            _subscription_id: &str,
            query: &str,
        ) -> Result<QueryResponse, vmssflex_api::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = query.to_string();
            if self.throttle.load(Ordering::SeqCst) {
                return Err(vmssflex_api::Error::Throttled {
                    retry_after: Some(Duration::from_secs(30)),
                });
            }
            Ok(QueryResponse {
                data: self.rows.clone(),
                ..Default::default()
            })
        }
    }

    struct Closed;

    impl ReadLimiter for Closed {
        fn try_accept(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn returns_single_match() {
        let graph = FakeGraph::returning(serde_json::json!([{ "name": "testvm1" }]));
        let lookup = ComputerNameLookup::new(Arc::clone(&graph), "sub");

        let name = lookup.vm_name_by_computer_name("rg", "vmssflex1000001").await.unwrap();
        assert_eq!(name, "testvm1");
        assert!(graph.last_query.lock().unwrap().contains("=~ 'vmssflex1000001'"));
    }

    #[tokio::test]
    async fn maps_row_counts() {
        let lookup = ComputerNameLookup::new(FakeGraph::returning(serde_json::json!([])), "sub");
        assert!(lookup.vm_name_by_computer_name("rg", "cn").await.unwrap_err().is_not_found());

        let lookup = ComputerNameLookup::new(
            FakeGraph::returning(serde_json::json!([{ "name": "a" }, { "name": "b" }])),
            "sub",
        );
        let err = lookup.vm_name_by_computer_name("rg", "cn").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::MultipleMatches { computer_name } if computer_name == "cn"
        ));

        let lookup = ComputerNameLookup::new(
            FakeGraph::returning(serde_json::json!([{ "id": "x" }])),
            "sub",
        );
        let err = lookup.vm_name_by_computer_name("rg", "cn").await.unwrap_err();
        assert!(matches!(err, CacheError::Fatal { .. }));
    }

    #[tokio::test]
    async fn limiter_rejects_without_remote_call() {
        let graph = FakeGraph::returning(serde_json::json!([]));
        let lookup = ComputerNameLookup::with_limiter(Arc::clone(&graph), "sub", Closed);

        let err = lookup.vm_name_by_computer_name("rg", "cn").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(graph.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn honours_retry_after() {
        tokio::time::pause();
        let graph = FakeGraph::returning(serde_json::json!([{ "name": "testvm1" }]));
        graph.throttle.store(true, Ordering::SeqCst);
        let lookup = ComputerNameLookup::new(Arc::clone(&graph), "sub");

        assert!(lookup.vm_name_by_computer_name("rg", "cn").await.unwrap_err().is_transient());
        graph.throttle.store(false, Ordering::SeqCst);

        let err = lookup.vm_name_by_computer_name("rg", "cn").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(graph.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(lookup.vm_name_by_computer_name("rg", "cn").await.unwrap(), "testvm1");
        assert_eq!(graph.calls.load(Ordering::SeqCst), 2);
    }
}
