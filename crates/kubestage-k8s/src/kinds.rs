//! The fixed set of Kubernetes kinds the engine ever touches (spec §4.3).

use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Namespace,
    Secret,
    Job,
    Deployment,
    Service,
    Ingress,
    CronJob,
    Pod,
}

impl Kind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Namespace => "Namespace",
            Kind::Secret => "Secret",
            Kind::Job => "Job",
            Kind::Deployment => "Deployment",
            Kind::Service => "Service",
            Kind::Ingress => "Ingress",
            Kind::CronJob => "CronJob",
            Kind::Pod => "Pod",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A type-erased wrapper over the handful of concrete `k8s_openapi` types
/// the engine creates, reads, or deletes. Keeping the trait object-safe
/// (spec §4.3's `Ensure(obj)` is genuinely polymorphic over kind) rules
/// out a generic `ClusterClient<K>`; this enum is the idiomatic
/// alternative used across the kube ecosystem when a single client needs
/// to move several owned resource kinds through one channel.
#[derive(Debug, Clone)]
pub enum ManagedObject {
    Namespace(Box<Namespace>),
    Secret(Box<Secret>),
    Job(Box<Job>),
    Deployment(Box<Deployment>),
    Service(Box<Service>),
    Ingress(Box<Ingress>),
    CronJob(Box<CronJob>),
    Pod(Box<Pod>),
}

impl ManagedObject {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            ManagedObject::Namespace(_) => Kind::Namespace,
            ManagedObject::Secret(_) => Kind::Secret,
            ManagedObject::Job(_) => Kind::Job,
            ManagedObject::Deployment(_) => Kind::Deployment,
            ManagedObject::Service(_) => Kind::Service,
            ManagedObject::Ingress(_) => Kind::Ingress,
            ManagedObject::CronJob(_) => Kind::CronJob,
            ManagedObject::Pod(_) => Kind::Pod,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            ManagedObject::Namespace(o) => o.name_any(),
            ManagedObject::Secret(o) => o.name_any(),
            ManagedObject::Job(o) => o.name_any(),
            ManagedObject::Deployment(o) => o.name_any(),
            ManagedObject::Service(o) => o.name_any(),
            ManagedObject::Ingress(o) => o.name_any(),
            ManagedObject::CronJob(o) => o.name_any(),
            ManagedObject::Pod(o) => o.name_any(),
        }
    }

    #[must_use]
    pub fn labels(&self) -> std::collections::BTreeMap<String, String> {
        match self {
            ManagedObject::Namespace(o) => o.labels().clone(),
            ManagedObject::Secret(o) => o.labels().clone(),
            ManagedObject::Job(o) => o.labels().clone(),
            ManagedObject::Deployment(o) => o.labels().clone(),
            ManagedObject::Service(o) => o.labels().clone(),
            ManagedObject::Ingress(o) => o.labels().clone(),
            ManagedObject::CronJob(o) => o.labels().clone(),
            ManagedObject::Pod(o) => o.labels().clone(),
        }
    }

    #[must_use]
    pub fn as_job(&self) -> Option<&Job> {
        match self {
            ManagedObject::Job(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            ManagedObject::Deployment(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            ManagedObject::Pod(o) => Some(o),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(ManagedObject),
    Modified(ManagedObject),
    Deleted(ManagedObject),
}
