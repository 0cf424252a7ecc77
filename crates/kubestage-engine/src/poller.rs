//! Status Poller (spec §4.5): one task per in-flight step, translating
//! raw Job/Deployment/Pod status into the terminal outcome enum within
//! a bounded time budget. Polls on an interval (the "periodic `Get`
//! fallback") rather than subscribing to watch directly, since the fake
//! client's object store is mutated by direct `put()` calls in tests —
//! grounded in the same cooperative-polling shape the teacher uses for
//! its `tasks/cancel/aware.rs` cancellation-aware loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use kubestage_k8s::{ClusterClient, Kind};
use kubestage_model::{ServiceStep, Step, TaskStep};

use crate::outcome::StepOutcome;

const MAX_BACKOFF_MULTIPLIER: u32 = 10;
const LOG_CAPTURE_BYTES: usize = 4 * 1024;

pub struct Poller {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    bundle_name: String,
    step: Step,
}

impl Poller {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, namespace: String, bundle_name: String, step: Step) -> Self {
        Self {
            client,
            namespace,
            bundle_name,
            step,
        }
    }

    #[instrument(skip(self, cancel), fields(step = %self.step.name(), bundle = %self.bundle_name))]
    pub async fn run(&self, cancel: CancellationToken) -> StepOutcome {
        let common = self.step.common();
        let base_interval = Duration::from_secs(u64::from(common.polling_interval_secs).max(1));
        let warm_up = Duration::from_secs(u64::from(common.warm_up_secs));
        let deadline = Instant::now() + warm_up + Duration::from_secs(u64::from(common.timeout_secs));

        let mut interval = base_interval;
        let mut consecutive_errors: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                return StepOutcome::timed_out(format!(
                    "step '{}' exceeded its {}s timeout",
                    self.step.name(),
                    common.timeout_secs
                ));
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    return StepOutcome::cancelled("cancelled by operator");
                }
                () = tokio::time::sleep(interval) => {}
            }

            match self.evaluate().await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {
                    consecutive_errors = 0;
                    interval = base_interval;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(error = %err, attempt = consecutive_errors, "transient error polling step status");
                    let multiplier = consecutive_errors.min(MAX_BACKOFF_MULTIPLIER);
                    interval = base_interval * multiplier;
                }
            }
        }
    }

    async fn evaluate(&self) -> Result<Option<StepOutcome>, kubestage_k8s::ClusterError> {
        match &self.step {
            Step::Task(task) => self.evaluate_job(task).await,
            Step::Service(svc) => self.evaluate_deployment(svc).await,
        }
    }

    async fn evaluate_job(&self, task: &TaskStep) -> Result<Option<StepOutcome>, kubestage_k8s::ClusterError> {
        let Some(obj) = self.client.get(Kind::Job, &self.namespace, &self.bundle_name).await? else {
            return Ok(None);
        };
        let Some(job) = obj.as_job() else { return Ok(None) };
        let Some(status) = &job.status else { return Ok(None) };

        if status.succeeded.unwrap_or(0) > 0 {
            return Ok(Some(StepOutcome::succeeded()));
        }

        let failed = status.failed.unwrap_or(0);
        if failed > task.backoff_limit as i32 {
            let logs = self.capture_logs().await;
            return Ok(Some(StepOutcome::failed(
                format!("job '{}' exhausted its backoff limit ({} failures)", self.bundle_name, failed),
                logs,
            )));
        }

        Ok(None)
    }

    async fn evaluate_deployment(&self, svc: &ServiceStep) -> Result<Option<StepOutcome>, kubestage_k8s::ClusterError> {
        let Some(obj) = self.client.get(Kind::Deployment, &self.namespace, &self.bundle_name).await? else {
            return Ok(None);
        };
        let Some(deployment) = obj.as_deployment() else { return Ok(None) };
        let Some(status) = &deployment.status else { return Ok(None) };

        let available = status.available_replicas.unwrap_or(0);
        if available >= svc.replicas as i32 {
            return Ok(Some(StepOutcome::succeeded()));
        }

        Ok(None)
    }

    async fn capture_logs(&self) -> Option<String> {
        let pods = self
            .client
            .list(Kind::Pod, &self.namespace, &format!("step={}", self.step.name()))
            .await
            .ok()?;
        let pod = pods.first()?;
        let logs = self
            .client
            .read_pod_logs(&self.namespace, &pod.name(), "main")
            .await
            .ok()?;
        Some(tail_bytes(&logs, LOG_CAPTURE_BYTES))
    }
}

fn tail_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let start = s.len() - max_bytes;
    let boundary = (start..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(start);
    s[boundary..].to_string()
}
