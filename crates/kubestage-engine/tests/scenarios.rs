//! End-to-end scenarios against the fake cluster client (spec §8 S1-S6).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;
use tokio_util::sync::CancellationToken;

use kubestage_engine::Executor;
use kubestage_k8s::{FakeClusterClient, ManagedObject};
use kubestage_model::{
    ServiceConfig, ServiceStep, SourceRef, Stage, Step, StepCommon, TaskStep, Workflow,
};
use kubestage_scm::{ResolvedSource, SourceFetcher};

struct StubFetcher;

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn tarball_url(
        &self,
        _repo_path: &str,
        _branch: &str,
        _token: Option<&str>,
    ) -> kubestage_scm::Result<ResolvedSource> {
        Ok(ResolvedSource {
            tarball_url: "https://api.github.com/repos/acme/models/tarball/main".to_string(),
            archive_root_prefix: "acme-models-abc1234".to_string(),
        })
    }
}

fn common(name: &str, timeout_secs: u32) -> StepCommon {
    StepCommon {
        name: name.to_string(),
        path_to_executable: "train.py".to_string(),
        dependency_path: "requirements.txt".to_string(),
        image: None,
        entrypoint: None,
        envs: BTreeMap::new(),
        secrets: Default::default(),
        cpu_millicores: 500,
        memory_request_mb: 500,
        timeout_secs,
        polling_interval_secs: 1,
        warm_up_secs: 0,
    }
}

fn workflow(name: &str, stages: Vec<Stage>) -> Workflow {
    Workflow {
        namespace: "ml-team".to_string(),
        name: name.to_string(),
        version: "1.0.0".to_string(),
        source: SourceRef {
            repository_url: "https://github.com/acme/models".to_string(),
            branch: "main".to_string(),
            token: None,
            project_id: None,
        },
        stages,
    }
}

fn job_name(wf: &str, stage: &str, step: &str) -> String {
    kubestage_engine::bundle_name(wf, stage, step)
}

/// Waits (briefly, polling) for the Executor to have `Ensure`'d the
/// named Job, then overlays a status onto it without disturbing the
/// labels the synthesizer attached — losing those would make the
/// sweeper's label-selector listing blind to the object.
async fn set_job_status(client: &FakeClusterClient, namespace: &str, name: &str, succeeded: i32, failed: i32) {
    let mut job = wait_for_job(client, namespace, name).await;
    job.status = Some(JobStatus { succeeded: Some(succeeded), failed: Some(failed), ..Default::default() });
    client.put(namespace, ManagedObject::Job(Box::new(job)));
}

async fn set_deployment_available(client: &FakeClusterClient, namespace: &str, name: &str, available: i32) {
    let mut deployment = wait_for_deployment(client, namespace, name).await;
    deployment.status = Some(DeploymentStatus { available_replicas: Some(available), ..Default::default() });
    client.put(namespace, ManagedObject::Deployment(Box::new(deployment)));
}

async fn wait_for_job(client: &FakeClusterClient, namespace: &str, name: &str) -> Job {
    loop {
        if let Some(ManagedObject::Job(job)) = client.get_sync(kubestage_k8s::Kind::Job, namespace, name) {
            return *job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_deployment(client: &FakeClusterClient, namespace: &str, name: &str) -> Deployment {
    loop {
        if let Some(ManagedObject::Deployment(deployment)) = client.get_sync(kubestage_k8s::Kind::Deployment, namespace, name) {
            return *deployment;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn s1_single_task_succeeds() {
    let client = FakeClusterClient::new();
    let executor = Executor::new(client.clone(), Arc::new(StubFetcher));

    let stage = Stage {
        name: "train".to_string(),
        steps: vec![Step::Task(TaskStep { common: common("sarimax", 30), backoff_limit: 0 })],
    };
    let wf = workflow("pipeline", vec![stage]);
    let name = job_name("pipeline", "train", "sarimax");

    let client2 = client.clone();
    let ns = wf.namespace.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        set_job_status(&client2, &ns, &name, 1, 0).await;
    });

    let result = executor.run(&wf, CancellationToken::new()).await;
    assert!(result.is_ok(), "expected success, got {result:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_parallel_steps_one_fails() {
    let client = FakeClusterClient::new();
    let executor = Executor::new(client.clone(), Arc::new(StubFetcher));

    let stage = Stage {
        name: "train".to_string(),
        steps: vec![
            Step::Task(TaskStep { common: common("sarimax", 30), backoff_limit: 0 }),
            Step::Task(TaskStep { common: common("deepar", 30), backoff_limit: 0 }),
        ],
    };
    let wf = workflow("pipeline", vec![stage]);
    let sarimax_name = job_name("pipeline", "train", "sarimax");
    let deepar_name = job_name("pipeline", "train", "deepar");

    let mut deepar_pod_labels = BTreeMap::new();
    deepar_pod_labels.insert("step".to_string(), "deepar".to_string());
    let deepar_pod = Pod {
        metadata: ObjectMeta {
            name: Some("deepar-pod".to_string()),
            namespace: Some(wf.namespace.clone()),
            labels: Some(deepar_pod_labels.into_iter().collect()),
            ..Default::default()
        },
        spec: None,
        status: None,
    };
    client.put(&wf.namespace, ManagedObject::Pod(Box::new(deepar_pod)));
    client.set_pod_logs(&wf.namespace, "deepar-pod", "traceback: division by zero\n");

    let client2 = client.clone();
    let ns = wf.namespace.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        set_job_status(&client2, &ns, &deepar_name, 0, 1).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        set_job_status(&client2, &ns, &sarimax_name, 1, 0).await;
    });

    let result = executor.run(&wf, CancellationToken::new()).await;
    match result {
        Err(kubestage_engine::EngineError::StepFailure { failures, .. }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].step, "deepar");
            assert!(failures[0].captured_logs.as_deref().unwrap_or_default().contains("division by zero"));
        }
        other => panic!("expected StepFailure naming deepar, got {other:?}"),
    }

    let remaining = client
        .get_sync(kubestage_k8s::Kind::Job, &wf.namespace, &job_name("pipeline", "train", "sarimax"));
    assert!(remaining.is_none(), "sweeper should have deleted the Job objects");
}

#[tokio::test(flavor = "multi_thread")]
async fn s3_service_step_reaches_available_and_is_not_swept() {
    let client = FakeClusterClient::new();
    let executor = Executor::new(client.clone(), Arc::new(StubFetcher));

    let mut step_common = common("api", 30);
    step_common.name = "api".to_string();
    let stage = Stage {
        name: "serve".to_string(),
        steps: vec![Step::Service(ServiceStep {
            common: step_common,
            replicas: 2,
            revision_history_limit: 1,
            min_ready_secs: 5,
            service: ServiceConfig { port: 8080, ingress: true, max_startup_secs: None },
        })],
    };
    let wf = workflow("pipeline", vec![stage]);
    let name = job_name("pipeline", "serve", "api");

    let client2 = client.clone();
    let ns = wf.namespace.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        set_deployment_available(&client2, &ns, &name, 2).await;
    });

    let result = executor.run(&wf, CancellationToken::new()).await;
    assert!(result.is_ok(), "expected success, got {result:?}");

    let deployment = client.get_sync(kubestage_k8s::Kind::Deployment, &wf.namespace, &name);
    assert!(deployment.is_some(), "deployment should remain, not be swept");
    let service = client.get_sync(kubestage_k8s::Kind::Service, &wf.namespace, &name);
    assert!(service.is_some());
    let ingress = client.get_sync(kubestage_k8s::Kind::Ingress, &wf.namespace, &name);
    assert!(ingress.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn s4_timeout_sweeps_and_reports() {
    let client = FakeClusterClient::new();
    let executor = Executor::new(client.clone(), Arc::new(StubFetcher));

    let stage = Stage {
        name: "train".to_string(),
        steps: vec![Step::Task(TaskStep { common: common("sarimax", 1), backoff_limit: 0 })],
    };
    let wf = workflow("pipeline", vec![stage]);

    let result = executor.run(&wf, CancellationToken::new()).await;
    assert!(matches!(result, Err(kubestage_engine::EngineError::Timeout { .. })), "expected timeout, got {result:?}");

    let name = job_name("pipeline", "train", "sarimax");
    let remaining = client.get_sync(kubestage_k8s::Kind::Job, &wf.namespace, &name);
    assert!(remaining.is_none(), "sweeper should have run after a timeout");
}

#[tokio::test(flavor = "multi_thread")]
async fn s6_private_source_ensures_repo_secret() {
    let client = FakeClusterClient::new();
    let executor = Executor::new(client.clone(), Arc::new(StubFetcher));

    let stage = Stage {
        name: "train".to_string(),
        steps: vec![Step::Task(TaskStep { common: common("sarimax", 30), backoff_limit: 0 })],
    };
    let mut wf = workflow("pipeline", vec![stage]);
    wf.source.token = Some("XYZ".to_string());

    let name = job_name("pipeline", "train", "sarimax");
    let client2 = client.clone();
    let ns = wf.namespace.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        set_job_status(&client2, &ns, &name, 1, 0).await;
    });

    let result = executor.run(&wf, CancellationToken::new()).await;
    assert!(result.is_ok(), "expected success, got {result:?}");

    let secret = client.get_sync(kubestage_k8s::Kind::Secret, &wf.namespace, &kubestage_engine::repo_secret_name(&wf.name));
    assert!(secret.is_some(), "repo-<name> secret should have been Ensure'd before stage 1");
}
