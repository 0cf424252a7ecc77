//! Executor (spec §4.4): drives stages in order, submitting every step
//! in a stage concurrently and waiting for all to reach a terminal
//! outcome before advancing or aborting.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use kubestage_k8s::{ClusterClient, ClusterError, Kind, ManagedObject};
use kubestage_model::{SecretKind, SecretRef, Step, Workflow};
use kubestage_scm::SourceFetcher;

use crate::error::{EngineError, Result, StepFailureDetail};
use crate::naming::{bundle_name, repo_secret_name};
use crate::outcome::PollState;
use crate::poller::Poller;
use crate::synth::{self, SourceProvisioning};
use crate::sweeper::Sweeper;

pub struct Executor {
    client: Arc<dyn ClusterClient>,
    fetcher: Arc<dyn SourceFetcher>,
    sweeper: Sweeper,
}

impl Executor {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        let sweeper = Sweeper::new(client.clone());
        Self { client, fetcher, sweeper }
    }

    #[instrument(skip(self, workflow, cancel), fields(workflow = %workflow.name, namespace = %workflow.namespace))]
    pub async fn run(&self, workflow: &Workflow, cancel: CancellationToken) -> Result<()> {
        let namespace_existed = self
            .client
            .get(Kind::Namespace, "", &workflow.namespace)
            .await?
            .is_some();
        self.client.ensure_namespace(&workflow.namespace, BTreeMap::new()).await?;
        let namespace_owned_by_run = !namespace_existed;

        if workflow.source.is_private() {
            self.ensure_repo_secret(workflow).await?;
        }

        let repo_path = kubestage_scm::repo_path_of(&workflow.source.repository_url);
        let resolved = self
            .fetcher
            .tarball_url(&repo_path, &workflow.source.branch, workflow.source.token.as_deref())
            .await
            .map_err(|e| EngineError::Precondition(e.to_string()))?;
        let source = SourceProvisioning {
            tarball_url: resolved.tarball_url,
            archive_root_prefix: resolved.archive_root_prefix,
            private: workflow.source.is_private(),
        };

        let known_secrets = self.list_known_secrets(&workflow.namespace).await?;

        for stage in &workflow.stages {
            info!(stage = %stage.name, steps = stage.steps.len(), "submitting stage");

            for step in &stage.steps {
                let bundle = synth::synthesize_step(workflow, stage, step, &source, &known_secrets);
                if let Err(err) = self.ensure_bundle(&workflow.namespace, &bundle).await {
                    self.sweeper.sweep_run(workflow).await.ok();
                    return Err(err);
                }
            }

            let mut set = JoinSet::new();
            for step in &stage.steps {
                let client = self.client.clone();
                let namespace = workflow.namespace.clone();
                let name = bundle_name(&workflow.name, &stage.name, step.name());
                let step = step.clone();
                let stage_name = stage.name.clone();
                let cancel = cancel.clone();
                set.spawn(async move {
                    let poller = Poller::new(client, namespace, name, step.clone());
                    let outcome = poller.run(cancel).await;
                    (stage_name, step.name().to_string(), outcome)
                });
            }

            let mut failures = Vec::new();
            while let Some(joined) = set.join_next().await {
                let (stage_name, step_name, outcome) = joined.expect("poller task panicked");
                if outcome.state != PollState::Succeeded {
                    failures.push((
                        outcome.state,
                        StepFailureDetail {
                            stage: stage_name,
                            step: step_name,
                            reason: outcome.reason,
                            captured_logs: outcome.captured_logs,
                        },
                    ));
                }
            }

            if !failures.is_empty() {
                self.sweeper.sweep_run(workflow).await.ok();
                let cancelled = failures.iter().any(|(state, _)| *state == PollState::Cancelled);
                let timed_out = failures.iter().any(|(state, _)| *state == PollState::TimedOut);
                let details: Vec<StepFailureDetail> = failures.into_iter().map(|(_, d)| d).collect();
                return Err(if cancelled {
                    EngineError::Cancelled
                } else if timed_out {
                    EngineError::Timeout { stage: stage.name.clone(), failures: details }
                } else {
                    EngineError::StepFailure { stage: stage.name.clone(), failures: details }
                });
            }
        }

        let _ = namespace_owned_by_run;
        Ok(())
    }

    #[instrument(skip(self, workflow))]
    pub async fn delete(&self, workflow: &Workflow, namespace_owned_by_run: bool) -> Result<()> {
        self.sweeper.sweep_workflow(workflow, namespace_owned_by_run).await?;
        Ok(())
    }

    async fn ensure_bundle(&self, namespace: &str, bundle: &crate::synth::Bundle) -> Result<()> {
        if let Some(job) = &bundle.job {
            self.client.ensure(namespace, ManagedObject::Job(Box::new(job.clone()))).await?;
        }
        if let Some(deployment) = &bundle.deployment {
            self.client
                .ensure(namespace, ManagedObject::Deployment(Box::new(deployment.clone())))
                .await?;
        }
        if let Some(service) = &bundle.service {
            self.client
                .ensure(namespace, ManagedObject::Service(Box::new(service.clone())))
                .await?;
        }
        if let Some(ingress) = &bundle.ingress {
            self.client
                .ensure(namespace, ManagedObject::Ingress(Box::new(ingress.clone())))
                .await?;
        }
        Ok(())
    }

    async fn ensure_repo_secret(&self, workflow: &Workflow) -> Result<()> {
        let Some(token) = &workflow.source.token else { return Ok(()) };
        let name = repo_secret_name(&workflow.name);
        let mut labels = BTreeMap::new();
        labels.insert("workflow".to_string(), workflow.name.clone());

        let mut data = BTreeMap::new();
        data.insert("GITHUB_TOKEN".to_string(), ByteString(token.clone().into_bytes()));

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(workflow.namespace.clone()),
                labels: Some(labels.into_iter().collect()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        };
        self.client.ensure(&workflow.namespace, ManagedObject::Secret(Box::new(secret))).await?;
        Ok(())
    }

    async fn list_known_secrets(&self, namespace: &str) -> std::result::Result<Vec<SecretRef>, ClusterError> {
        let objects = self.client.list(Kind::Secret, namespace, "").await?;
        Ok(objects
            .iter()
            .filter_map(|obj| match obj {
                ManagedObject::Secret(secret) => Some(secret_ref_from_k8s(namespace, secret)),
                _ => None,
            })
            .collect())
    }
}

fn secret_ref_from_k8s(namespace: &str, secret: &Secret) -> SecretRef {
    let name = secret.metadata.name.clone().unwrap_or_default();
    let owning_workflow = secret
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get("workflow"))
        .cloned();

    let is_docker_registry = secret.type_.as_deref() == Some("kubernetes.io/dockerconfigjson");
    let data = secret.data.clone().unwrap_or_default();

    let kind = if is_docker_registry {
        let dockerconfigjson = data
            .get(".dockerconfigjson")
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
            .unwrap_or_default();
        SecretKind::DockerRegistry { dockerconfigjson }
    } else {
        let fields = data
            .into_iter()
            .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
            .collect();
        SecretKind::Opaque(fields)
    };

    SecretRef {
        namespace: namespace.to_string(),
        name,
        kind,
        owning_workflow,
    }
}
