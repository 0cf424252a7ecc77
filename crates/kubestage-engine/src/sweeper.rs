//! Sweeper (spec §4.6): deletes, in reverse creation order, every
//! object under a workflow's label selector. Pure function of
//! `(namespace, workflow name)` per spec §9 "label selector as
//! ownership model" — no parallel in-memory registry of created
//! objects.

use std::sync::Arc;

use tracing::instrument;

use kubestage_k8s::{ClusterClient, ClusterError, Kind};
use kubestage_model::Workflow;

/// Kinds created per run, in creation order. The sweeper deletes them
/// in reverse.
const RUN_KINDS_CREATION_ORDER: &[Kind] = &[Kind::Job, Kind::Deployment, Kind::Service, Kind::Ingress];

pub struct Sweeper {
    client: Arc<dyn ClusterClient>,
}

impl Sweeper {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Invoked on step failure, timeout, or cancellation. Does not
    /// touch the workflow-scoped repo secret or the namespace.
    #[instrument(skip(self, workflow), fields(workflow = %workflow.name))]
    pub async fn sweep_run(&self, workflow: &Workflow) -> Result<(), ClusterError> {
        let selector = workflow.selector();
        for kind in RUN_KINDS_CREATION_ORDER.iter().rev() {
            self.delete_all(*kind, &workflow.namespace, &selector).await?;
        }
        Ok(())
    }

    /// Invoked on `delete workflow`: sweeps the run-scoped objects,
    /// then the workflow-scoped repo secret, then the namespace itself
    /// if this run owns it and no other workflow remains in it.
    #[instrument(skip(self, workflow), fields(workflow = %workflow.name))]
    pub async fn sweep_workflow(&self, workflow: &Workflow, namespace_owned_by_run: bool) -> Result<(), ClusterError> {
        self.sweep_run(workflow).await?;

        let selector = workflow.selector();
        self.delete_all(Kind::Secret, &workflow.namespace, &selector).await?;

        if namespace_owned_by_run && self.namespace_is_empty_of_workflows(&workflow.namespace).await? {
            self.client.delete_namespace(&workflow.namespace).await?;
        }
        Ok(())
    }

    async fn delete_all(&self, kind: Kind, namespace: &str, selector: &str) -> Result<(), ClusterError> {
        let objects = self.client.list(kind, namespace, selector).await?;
        for obj in objects {
            self.client.delete(kind, namespace, &obj.name()).await?;
        }
        Ok(())
    }

    async fn namespace_is_empty_of_workflows(&self, namespace: &str) -> Result<bool, ClusterError> {
        for kind in [
            Kind::Job,
            Kind::Deployment,
            Kind::Service,
            Kind::Ingress,
            Kind::CronJob,
            Kind::Secret,
            Kind::Pod,
        ] {
            let remaining = self.client.list(kind, namespace, "").await?;
            if remaining.iter().any(|o| o.labels().contains_key("workflow")) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
