//! Kube-backed `ClusterClient`. Not named anywhere in spec.md itself —
//! the spec treats the cluster as an external collaborator — but a
//! compiling binary needs one concrete implementation, so this is
//! grounded directly in how the teacher talks to the API server
//! (`kube::Api::namespaced`, `PatchParams::apply`, `kube::runtime::watcher`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::watcher::{self, watcher};
use kube::{Api, Client, ResourceExt};
use tracing::instrument;

use crate::client::ClusterClient;
use crate::error::ClusterError;
use crate::kinds::{Kind, ManagedObject, WatchEvent};

pub struct LiveClusterClient {
    client: Client,
}

impl LiveClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn jobs(&self, ns: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn deployments(&self, ns: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn services(&self, ns: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn ingresses(&self, ns: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn secrets(&self, ns: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn cronjobs(&self, ns: &str) -> Api<CronJob> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn pods(&self, ns: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), ns)
    }
    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

const FIELD_MANAGER: &str = "kubestage";

macro_rules! ensure_kind {
    ($api:expr, $name:expr, $obj:expr, $variant:ident) => {{
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        let applied = $api
            .patch($name, &pp, &Patch::Apply(&*$obj))
            .await
            .map_err(|e| ClusterError::from_kube(stringify!($variant), "", $name, e))?;
        Ok(ManagedObject::$variant(Box::new(applied)))
    }};
}

#[async_trait]
impl ClusterClient for LiveClusterClient {
    #[instrument(skip(self, desired), fields(kind = %desired.kind(), name = %desired.name()))]
    async fn ensure(&self, namespace: &str, desired: ManagedObject) -> Result<ManagedObject, ClusterError> {
        let name = desired.name();
        match desired {
            ManagedObject::Namespace(obj) => ensure_kind!(self.namespaces(), &name, obj, Namespace),
            ManagedObject::Secret(obj) => ensure_kind!(self.secrets(namespace), &name, obj, Secret),
            ManagedObject::Job(obj) => ensure_kind!(self.jobs(namespace), &name, obj, Job),
            ManagedObject::Deployment(obj) => ensure_kind!(self.deployments(namespace), &name, obj, Deployment),
            ManagedObject::Service(obj) => ensure_kind!(self.services(namespace), &name, obj, Service),
            ManagedObject::Ingress(obj) => ensure_kind!(self.ingresses(namespace), &name, obj, Ingress),
            ManagedObject::CronJob(obj) => ensure_kind!(self.cronjobs(namespace), &name, obj, CronJob),
            ManagedObject::Pod(obj) => ensure_kind!(self.pods(namespace), &name, obj, Pod),
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<ManagedObject>, ClusterError> {
        let result = match kind {
            Kind::Namespace => self
                .namespaces()
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Namespace(Box::new(o)))),
            Kind::Secret => self
                .secrets(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Secret(Box::new(o)))),
            Kind::Job => self
                .jobs(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Job(Box::new(o)))),
            Kind::Deployment => self
                .deployments(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Deployment(Box::new(o)))),
            Kind::Service => self
                .services(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Service(Box::new(o)))),
            Kind::Ingress => self
                .ingresses(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Ingress(Box::new(o)))),
            Kind::CronJob => self
                .cronjobs(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::CronJob(Box::new(o)))),
            Kind::Pod => self
                .pods(namespace)
                .get_opt(name)
                .await
                .map(|o| o.map(|o| ManagedObject::Pod(Box::new(o)))),
        };
        result.map_err(|e| ClusterError::from_kube(kind.as_str(), namespace, name, e))
    }

    #[instrument(skip(self))]
    async fn list(&self, kind: Kind, namespace: &str, label_selector: &str) -> Result<Vec<ManagedObject>, ClusterError> {
        let lp = ListParams::default().labels(label_selector);
        macro_rules! list_kind {
            ($api:expr, $variant:ident) => {{
                let list = $api
                    .list(&lp)
                    .await
                    .map_err(|e| ClusterError::from_kube(kind.as_str(), namespace, "*", e))?;
                Ok(list
                    .items
                    .into_iter()
                    .map(|o| ManagedObject::$variant(Box::new(o)))
                    .collect())
            }};
        }
        match kind {
            Kind::Namespace => list_kind!(self.namespaces(), Namespace),
            Kind::Secret => list_kind!(self.secrets(namespace), Secret),
            Kind::Job => list_kind!(self.jobs(namespace), Job),
            Kind::Deployment => list_kind!(self.deployments(namespace), Deployment),
            Kind::Service => list_kind!(self.services(namespace), Service),
            Kind::Ingress => list_kind!(self.ingresses(namespace), Ingress),
            Kind::CronJob => list_kind!(self.cronjobs(namespace), CronJob),
            Kind::Pod => list_kind!(self.pods(namespace), Pod),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let dp = DeleteParams::default();
        macro_rules! delete_kind {
            ($api:expr) => {
                match $api.delete(name, &dp).await {
                    Ok(_) => Ok(()),
                    Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
                    Err(e) => Err(ClusterError::from_kube(kind.as_str(), namespace, name, e)),
                }
            };
        }
        match kind {
            Kind::Namespace => delete_kind!(self.namespaces()),
            Kind::Secret => delete_kind!(self.secrets(namespace)),
            Kind::Job => delete_kind!(self.jobs(namespace)),
            Kind::Deployment => delete_kind!(self.deployments(namespace)),
            Kind::Service => delete_kind!(self.services(namespace)),
            Kind::Ingress => delete_kind!(self.ingresses(namespace)),
            Kind::CronJob => delete_kind!(self.cronjobs(namespace)),
            Kind::Pod => delete_kind!(self.pods(namespace)),
        }
    }

    #[instrument(skip(self))]
    async fn watch(
        &self,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClusterError>>, ClusterError> {
        let wc = watcher::Config::default().labels(label_selector);
        let namespace = namespace.to_string();

        macro_rules! watch_kind {
            ($api:expr, $variant:ident) => {{
                let stream = watcher($api, wc).flat_map(move |event| {
                    let events: Vec<Result<WatchEvent, ClusterError>> = match event {
                        Ok(watcher::Event::Applied(obj)) => {
                            vec![Ok(WatchEvent::Modified(ManagedObject::$variant(Box::new(obj))))]
                        }
                        Ok(watcher::Event::Restarted(objs)) => objs
                            .into_iter()
                            .map(|obj| Ok(WatchEvent::Added(ManagedObject::$variant(Box::new(obj)))))
                            .collect(),
                        Ok(watcher::Event::Deleted(obj)) => {
                            vec![Ok(WatchEvent::Deleted(ManagedObject::$variant(Box::new(obj))))]
                        }
                        Err(e) => vec![Err(ClusterError::Transient(e.to_string()))],
                    };
                    futures::stream::iter(events)
                });
                Ok(stream.boxed())
            }};
        }
        match kind {
            Kind::Namespace => watch_kind!(self.namespaces(), Namespace),
            Kind::Secret => watch_kind!(self.secrets(&namespace), Secret),
            Kind::Job => watch_kind!(self.jobs(&namespace), Job),
            Kind::Deployment => watch_kind!(self.deployments(&namespace), Deployment),
            Kind::Service => watch_kind!(self.services(&namespace), Service),
            Kind::Ingress => watch_kind!(self.ingresses(&namespace), Ingress),
            Kind::CronJob => watch_kind!(self.cronjobs(&namespace), CronJob),
            Kind::Pod => watch_kind!(self.pods(&namespace), Pod),
        }
    }

    #[instrument(skip(self))]
    async fn read_pod_logs(&self, namespace: &str, pod_name: &str, container: &str) -> Result<String, ClusterError> {
        let lp = kube::api::LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(500),
            ..Default::default()
        };
        self.pods(namespace)
            .logs(pod_name, &lp)
            .await
            .map_err(|e| ClusterError::from_kube("Pod", namespace, pod_name, e))
    }

    #[instrument(skip(self))]
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        match self.namespaces().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(ClusterError::from_kube("Namespace", "", name, e)),
        }
    }

    #[instrument(skip(self))]
    async fn ensure_namespace(&self, name: &str, labels: BTreeMap<String, String>) -> Result<(), ClusterError> {
        let mut ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.into_iter().collect()),
                ..Default::default()
            },
            ..Default::default()
        };
        ns.meta_mut().name = Some(name.to_string());
        let api = self.namespaces();
        if api.get_opt(name).await.map_err(|e| ClusterError::from_kube("Namespace", "", name, e))?.is_some() {
            return Ok(());
        }
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) | Err(kube::Error::Api(kube::core::ErrorResponse { code: 409, .. })) => Ok(()),
            Err(e) => Err(ClusterError::from_kube("Namespace", "", name, e)),
        }
    }
}
