//! Cron materialization (spec §3 "CronWorkflow", §8 S5): a workflow plus
//! a schedule becomes exactly one `CronJob` that re-invokes the CLI in
//! `run` mode inside the runner image. The engine is not re-entered
//! client-side for scheduled triggers.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use kube::api::ObjectMeta;

use kubestage_model::CronWorkflow;

const DEFAULT_RUNNER_IMAGE: &str = "ghcr.io/kubestage/runner:latest";

#[must_use]
pub fn synthesize_cronjob(cron: &CronWorkflow) -> CronJob {
    let workflow = &cron.workflow;
    let mut labels = BTreeMap::new();
    labels.insert("workflow".to_string(), workflow.name.clone());

    let container = Container {
        name: "run".to_string(),
        image: Some(DEFAULT_RUNNER_IMAGE.to_string()),
        command: Some(vec![
            "kubestage".to_string(),
            "run".to_string(),
            "--namespace".to_string(),
            workflow.namespace.clone(),
            "--branch".to_string(),
            workflow.source.branch.clone(),
        ]),
        ..Default::default()
    };

    let job_template = JobTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone().into_iter().collect()),
            ..Default::default()
        }),
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("OnFailure".to_string()),
                    ..Default::default()
                }),
            },
            backoff_limit: Some(0),
            ..Default::default()
        }),
    };

    CronJob {
        metadata: ObjectMeta {
            name: Some(workflow.name.clone()),
            namespace: Some(workflow.namespace.clone()),
            labels: Some(labels.into_iter().collect()),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: cron.schedule.clone(),
            job_template,
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubestage_model::{SourceRef, Stage, Workflow};

    fn sample_cron() -> CronWorkflow {
        CronWorkflow {
            workflow: Workflow {
                namespace: "ml-team".to_string(),
                name: "nightly-train".to_string(),
                version: "1.0.0".to_string(),
                source: SourceRef {
                    repository_url: "https://github.com/acme/models".to_string(),
                    branch: "main".to_string(),
                    token: None,
                    project_id: None,
                },
                stages: vec![Stage { name: "train".to_string(), steps: vec![] }],
            },
            schedule: "0 12 * * *".to_string(),
        }
    }

    #[test]
    fn synthesizes_exactly_one_cronjob_with_the_given_schedule() {
        let cron = sample_cron();
        let cronjob = synthesize_cronjob(&cron);
        assert_eq!(cronjob.spec.unwrap().schedule, "0 12 * * *");
        assert_eq!(cronjob.metadata.name.as_deref(), Some("nightly-train"));
    }
}
