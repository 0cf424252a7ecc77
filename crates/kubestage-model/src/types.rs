//! The validated, in-memory workflow data model (spec §3).

use std::collections::{BTreeMap, BTreeSet};

/// Identity of a workflow is `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub source: SourceRef,
    pub stages: Vec<Stage>,
}

impl Workflow {
    /// Label selector identifying every object this workflow owns.
    #[must_use]
    pub fn selector(&self) -> String {
        format!("workflow={}", self.name)
    }
}

/// Repository coordinates plus optional credentials for the source fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub repository_url: String,
    pub branch: String,
    pub token: Option<String>,
    pub project_id: Option<String>,
}

impl SourceRef {
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.token.is_some()
    }
}

/// An ordered group of steps run in parallel; stages run sequentially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub steps: Vec<Step>,
}

/// One unit of compute: either a run-to-completion Task or a long-lived Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Task(TaskStep),
    Service(ServiceStep),
}

impl Step {
    #[must_use]
    pub fn common(&self) -> &StepCommon {
        match self {
            Step::Task(t) => &t.common,
            Step::Service(s) => &s.common,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.common().name
    }
}

/// Fields shared by every step variant (spec §3 "Common attributes").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommon {
    pub name: String,
    pub path_to_executable: String,
    pub dependency_path: String,
    pub image: Option<String>,
    pub entrypoint: Option<String>,
    pub envs: BTreeMap<String, String>,
    pub secrets: BTreeSet<String>,
    /// Fractional CPU cores, stored as millicores to avoid float comparisons downstream.
    pub cpu_millicores: u32,
    pub memory_request_mb: u32,
    pub timeout_secs: u32,
    pub polling_interval_secs: u32,
    pub warm_up_secs: u32,
}

/// Task-step-only fields: run-to-completion via a Kubernetes Job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStep {
    pub common: StepCommon,
    pub backoff_limit: u32,
}

/// Service-step-only fields: long-lived Deployment (+Service/+Ingress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStep {
    pub common: StepCommon,
    pub replicas: u32,
    pub revision_history_limit: u32,
    pub min_ready_secs: u32,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub ingress: bool,
    pub max_startup_secs: Option<u32>,
}

/// A recognized Secret shape (spec §3 "Secret").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretKind {
    Opaque(BTreeMap<String, String>),
    DockerRegistry { dockerconfigjson: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
    pub kind: SecretKind,
    /// Secrets tagged with the owning workflow are swept on `delete workflow`.
    pub owning_workflow: Option<String>,
}

/// A five-field cron expression plus the workflow it materializes (spec §3 "CronWorkflow").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronWorkflow {
    pub workflow: Workflow,
    pub schedule: String,
}
