//! In-memory `ClusterClient` used by `kubestage-engine`'s integration
//! tests (spec §8, scenarios S1-S6). No network, no real clock: tests
//! drive state transitions by calling `set_job_status` / `push_event`
//! directly instead of waiting on a real kube-apiserver.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::client::ClusterClient;
use crate::error::ClusterError;
use crate::kinds::{Kind, ManagedObject, WatchEvent};

struct ObjectKey;

impl ObjectKey {
    fn of(kind: Kind, namespace: &str, name: &str) -> String {
        format!("{kind}/{namespace}/{name}")
    }
}

/// Shared, clonable handle over the fake cluster's object store, so
/// tests can hold a reference while also handing the trait object to
/// the engine under test.
pub struct FakeClusterClient {
    objects: DashMap<String, ManagedObject>,
    events: broadcast::Sender<WatchEvent>,
    pod_logs: DashMap<String, String>,
    fail_next_ensure: DashMap<String, ClusterErrorKind>,
}

#[derive(Clone, Copy)]
pub enum ClusterErrorKind {
    RbacDenied,
    QuotaExceeded,
    Transient,
}

impl Default for FakeClusterClient {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            objects: DashMap::new(),
            events: tx,
            pod_logs: DashMap::new(),
            fail_next_ensure: DashMap::new(),
        }
    }
}

impl FakeClusterClient {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Test hook: seeds or overwrites an object without going through
    /// `ensure`, useful for simulating out-of-band cluster state.
    pub fn put(&self, namespace: &str, obj: ManagedObject) {
        let key = ObjectKey::of(obj.kind(), namespace, &obj.name());
        self.objects.insert(key, obj);
    }

    pub fn set_pod_logs(&self, namespace: &str, pod_name: &str, logs: impl Into<String>) {
        self.pod_logs.insert(format!("{namespace}/{pod_name}"), logs.into());
    }

    /// Test hook: the next `ensure` call for this kind/namespace/name
    /// fails with the given error instead of succeeding.
    pub fn fail_next_ensure(&self, kind: Kind, namespace: &str, name: &str, err: ClusterErrorKind) {
        self.fail_next_ensure.insert(ObjectKey::of(kind, namespace, name), err);
    }

    pub fn push_event(&self, event: WatchEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn get_sync(&self, kind: Kind, namespace: &str, name: &str) -> Option<ManagedObject> {
        self.objects.get(&ObjectKey::of(kind, namespace, name)).map(|e| e.value().clone())
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn ensure(&self, namespace: &str, desired: ManagedObject) -> Result<ManagedObject, ClusterError> {
        let key = ObjectKey::of(desired.kind(), namespace, &desired.name());
        if let Some((_, kind)) = self.fail_next_ensure.remove(&key) {
            return Err(match kind {
                ClusterErrorKind::RbacDenied => ClusterError::RbacDenied("forbidden".into()),
                ClusterErrorKind::QuotaExceeded => ClusterError::QuotaExceeded("exceeded quota".into()),
                ClusterErrorKind::Transient => ClusterError::Transient("connection reset".into()),
            });
        }
        self.objects.insert(key, desired.clone());
        self.events.send(WatchEvent::Modified(desired.clone())).ok();
        Ok(desired)
    }

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<ManagedObject>, ClusterError> {
        Ok(self.objects.get(&ObjectKey::of(kind, namespace, name)).map(|e| e.value().clone()))
    }

    async fn list(&self, kind: Kind, namespace: &str, label_selector: &str) -> Result<Vec<ManagedObject>, ClusterError> {
        let wanted = parse_selector(label_selector);
        Ok(self
            .objects
            .iter()
            .filter(|entry| {
                let obj = entry.value();
                obj.kind() == kind
                    && entry.key().starts_with(&format!("{kind}/{namespace}/"))
                    && matches_selector(&obj.labels(), &wanted)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let key = ObjectKey::of(kind, namespace, name);
        if let Some((_, obj)) = self.objects.remove(&key) {
            self.events.send(WatchEvent::Deleted(obj)).ok();
        }
        Ok(())
    }

    async fn watch(
        &self,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClusterError>>, ClusterError> {
        let wanted = parse_selector(label_selector);
        let namespace = namespace.to_string();
        let rx = self.events.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |event| {
            let wanted = wanted.clone();
            let namespace = namespace.clone();
            async move {
                match event {
                    Ok(ev) => {
                        let obj = match &ev {
                            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
                        };
                        if obj.kind() == kind && matches_selector(&obj.labels(), &wanted) {
                            let _ = &namespace;
                            Some(Ok(ev))
                        } else {
                            None
                        }
                    }
                    Err(_) => Some(Err(ClusterError::Transient("watch lagged".into()))),
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn read_pod_logs(&self, namespace: &str, pod_name: &str, _container: &str) -> Result<String, ClusterError> {
        self.pod_logs
            .get(&format!("{namespace}/{pod_name}"))
            .map(|e| e.value().clone())
            .ok_or_else(|| ClusterError::NotFound {
                kind: "Pod".into(),
                namespace: namespace.into(),
                name: pod_name.into(),
            })
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.objects.retain(|k, _| !k.contains(&format!("/{name}/")));
        Ok(())
    }

    async fn ensure_namespace(&self, _name: &str, _labels: BTreeMap<String, String>) -> Result<(), ClusterError> {
        Ok(())
    }
}

fn parse_selector(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn matches_selector(labels: &BTreeMap<String, String>, wanted: &BTreeMap<String, String>) -> bool {
    wanted.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn secret(name: &str, namespace: &str, labels: &[(&str, &str)]) -> ManagedObject {
        let labels: BTreeMap<String, String> =
            labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ManagedObject::Secret(Box::new(Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels.into_iter().collect()),
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn ensure_then_get_round_trips() {
        let client = FakeClusterClient::new();
        client.ensure("ml-team", secret("repo-demo", "ml-team", &[])).await.unwrap();
        let got = client.get(Kind::Secret, "ml-team", "repo-demo").await.unwrap();
        assert!(got.is_some());
        assert_eq!(got.unwrap().name(), "repo-demo");
    }

    #[tokio::test]
    async fn get_on_an_absent_object_is_none_not_an_error() {
        let client = FakeClusterClient::new();
        let got = client.get(Kind::Secret, "ml-team", "nope").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn list_filters_by_namespace_kind_and_selector() {
        let client = FakeClusterClient::new();
        client.ensure("ml-team", secret("a", "ml-team", &[("workflow", "pipeline")])).await.unwrap();
        client.ensure("ml-team", secret("b", "ml-team", &[("workflow", "other")])).await.unwrap();
        client.ensure("other-ns", secret("c", "other-ns", &[("workflow", "pipeline")])).await.unwrap();

        let matched = client.list(Kind::Secret, "ml-team", "workflow=pipeline").await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name(), "a");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let client = FakeClusterClient::new();
        client.ensure("ml-team", secret("a", "ml-team", &[])).await.unwrap();
        client.delete(Kind::Secret, "ml-team", "a").await.unwrap();
        assert!(client.get(Kind::Secret, "ml-team", "a").await.unwrap().is_none());
        // Deleting an object that is already gone is still success.
        client.delete(Kind::Secret, "ml-team", "a").await.unwrap();
    }

    #[tokio::test]
    async fn fail_next_ensure_consumes_itself() {
        let client = FakeClusterClient::new();
        client.fail_next_ensure(Kind::Secret, "ml-team", "a", ClusterErrorKind::RbacDenied);

        let first = client.ensure("ml-team", secret("a", "ml-team", &[])).await;
        assert!(matches!(first, Err(ClusterError::RbacDenied(_))));

        let second = client.ensure("ml-team", secret("a", "ml-team", &[])).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn watch_only_yields_events_matching_kind_and_selector() {
        let client = FakeClusterClient::new();
        let mut stream = client.watch(Kind::Secret, "ml-team", "workflow=pipeline").await.unwrap();

        client.push_event(WatchEvent::Added(secret("a", "ml-team", &[("workflow", "other")])));
        client.push_event(WatchEvent::Added(secret("b", "ml-team", &[("workflow", "pipeline")])));

        let next = stream.next().await.unwrap().unwrap();
        match next {
            WatchEvent::Added(obj) => assert_eq!(obj.name(), "b"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
