use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::request::MetricRequest;

/// A registered request together with the bucket it lives in
#[derive(Debug, Clone)]
pub struct RequestEntry {
    pub metric_name: String,
    pub id: Uuid,
    pub request: Arc<MetricRequest>,
}

/// Requests keyed by metric name, then by request id
#[derive(Debug, Default)]
pub struct RequestTable {
    requests: RwLock<HashMap<String, HashMap<Uuid, Arc<MetricRequest>>>>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a request, creating its metric bucket if needed
    pub fn register(&self, metric_name: &str, id: Uuid, request: Arc<MetricRequest>) {
        self.requests
            .write()
            .entry(metric_name.to_string())
            .or_default()
            .insert(id, request);
    }

    /// Remove a request, returning it if it was registered
    pub fn delete(&self, metric_name: &str, id: Uuid) -> Option<Arc<MetricRequest>> {
        let mut requests = self.requests.write();
        let bucket = requests.get_mut(metric_name)?;
        let removed = bucket.remove(&id);
        if bucket.is_empty() {
            requests.remove(metric_name);
        }
        removed
    }

    /// Snapshot of one metric's requests; empty if the metric is unknown
    pub fn get_requests(&self, metric_name: &str) -> HashMap<Uuid, Arc<MetricRequest>> {
        self.requests
            .read()
            .get(metric_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of all requests by id.
    ///
    /// An id registered under several metrics appears once; which bucket wins
    /// is unspecified. Use [`RequestTable::get_requests`] or
    /// [`RequestTable::snapshot`] when that matters.
    pub fn get_all_requests_flat(&self) -> HashMap<Uuid, Arc<MetricRequest>> {
        let requests = self.requests.read();
        let mut flat = HashMap::new();
        for bucket in requests.values() {
            flat.extend(bucket.iter().map(|(id, request)| (*id, request.clone())));
        }
        flat
    }

    /// Every registered request with its bucket, taken under one lock
    pub fn snapshot(&self) -> Vec<RequestEntry> {
        let requests = self.requests.read();
        requests
            .iter()
            .flat_map(|(metric_name, bucket)| {
                bucket.iter().map(move |(id, request)| RequestEntry {
                    metric_name: metric_name.clone(),
                    id: *id,
                    request: request.clone(),
                })
            })
            .collect()
    }

    pub fn has_requests(&self) -> bool {
        self.requests.read().values().any(|bucket| !bucket.is_empty())
    }

    /// Distinct model ids across all registered requests
    pub fn get_model_ids(&self) -> HashSet<String> {
        self.requests
            .read()
            .values()
            .flat_map(|bucket| bucket.values().map(|request| request.model_id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.requests.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_requests()
    }

    /// Run `f` only while the request is registered; deletion waits for `f`
    pub(crate) fn if_registered<R>(&self, metric_name: &str, id: Uuid, f: impl FnOnce() -> R) -> Option<R> {
        let requests = self.requests.read();
        if requests.get(metric_name).map_or(false, |bucket| bucket.contains_key(&id)) {
            Some(f())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{IdentityParams, ReconcilableField, RequestKind};

    fn request(model_id: &str, metric: &str) -> Arc<MetricRequest> {
        Arc::new(MetricRequest::new(
            model_id,
            metric,
            10,
            RequestKind::Identity(IdentityParams {
                column_name: ReconcilableField::column("x"),
                lower_thresh: None,
                upper_thresh: None,
            }),
        ))
    }

    #[test]
    fn test_register_and_query() {
        let table = RequestTable::new();
        assert!(!table.has_requests());
        assert!(table.get_requests("SPD").is_empty());

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        table.register("SPD", a, request("m1", "SPD"));
        table.register("DIR", b, request("m2", "DIR"));

        assert!(table.has_requests());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_requests("SPD").len(), 1);
        assert_eq!(table.get_all_requests_flat().len(), 2);

        let models = table.get_model_ids();
        assert!(models.contains("m1") && models.contains("m2"));
    }

    #[test]
    fn test_delete() {
        let table = RequestTable::new();
        let id = Uuid::new_v4();
        table.register("SPD", id, request("m1", "SPD"));

        assert!(table.delete("SPD", id).is_some());
        assert!(table.delete("SPD", id).is_none());
        assert!(table.delete("DIR", id).is_none());
        assert!(!table.has_requests());
        assert!(table.get_model_ids().is_empty());
    }

    #[test]
    fn test_same_id_in_two_buckets() {
        let table = RequestTable::new();
        let id = Uuid::new_v4();
        table.register("SPD", id, request("m1", "SPD"));
        table.register("DIR", id, request("m1", "DIR"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.snapshot().len(), 2);
        assert_eq!(table.get_all_requests_flat().len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let table = RequestTable::new();
        let id = Uuid::new_v4();
        table.register("SPD", id, request("m1", "SPD"));

        let snapshot = table.get_requests("SPD");
        table.delete("SPD", id);
        assert_eq!(snapshot.len(), 1);
        assert!(table.if_registered("SPD", id, || ()).is_none());
    }

    #[test]
    fn test_concurrent_registration() {
        let table = Arc::new(RequestTable::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        table.register("SPD", Uuid::new_v4(), request(&format!("m{}", i), "SPD"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.len(), 400);
        assert_eq!(table.get_model_ids().len(), 8);
    }
}
