//! The `ClusterClient` capability surface (spec §4.3): the Resource
//! Synthesizer and Executor never touch `kube::Api<K>` directly, only
//! this trait, which is why both the live and fake implementations can
//! sit behind one `Arc<dyn ClusterClient>`.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ClusterError;
use crate::kinds::{Kind, ManagedObject, WatchEvent};

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create-or-update. Implementations diff against the live object
    /// (when present) and `replace` only if the desired spec actually
    /// changed, per spec §4.3's idempotent-apply requirement.
    async fn ensure(&self, namespace: &str, desired: ManagedObject) -> Result<ManagedObject, ClusterError>;

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<ManagedObject>, ClusterError>;

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ManagedObject>, ClusterError>;

    /// Idempotent: deleting an object that is already gone is success,
    /// not `NotFound` (spec §4.6, Sweeper invariant).
    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn watch(
        &self,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClusterError>>, ClusterError>;

    async fn read_pod_logs(&self, namespace: &str, pod_name: &str, container: &str) -> Result<String, ClusterError>;

    /// Deletes the namespace itself. Only ever invoked when the workflow
    /// owns the namespace outright (spec §4.6).
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    async fn ensure_namespace(&self, name: &str, labels: std::collections::BTreeMap<String, String>) -> Result<(), ClusterError>;
}
