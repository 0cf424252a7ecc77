//! One handler per `(verb, noun)` pair. Each handler owns its own
//! cluster connection so that `--check` validation never has to build
//! one at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use kubestage_engine::Executor;
use kubestage_k8s::{ClusterClient, Kind, LiveClusterClient, ManagedObject};
use kubestage_model::{load_workflow, CronWorkflow, LoadParams, SourceRef, Stage, Workflow};

use crate::cli::{CronWorkflowArgs, ListArgs, SecretArgs, WorkflowArgs};
use crate::error::AppError;
use crate::output;
use crate::secretfile;

const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

async fn live_client() -> Result<Arc<dyn ClusterClient>, AppError> {
    let client = Client::try_default().await.map_err(|e| AppError::Other(e.into()))?;
    Ok(Arc::new(LiveClusterClient::new(client)))
}

fn cancellation_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        warn("cancellation requested, sweeping in-flight stage");
        child.cancel();
    });
    token
}

fn warn(msg: &str) {
    output::warn(msg);
}

async fn known_secret_names(client: &Arc<dyn ClusterClient>, namespace: &str) -> Result<BTreeSet<String>, AppError> {
    let objects = client.list(Kind::Secret, namespace, "").await?;
    Ok(objects.iter().map(ManagedObject::name).collect())
}

fn required_id(args_id: Option<&str>, noun: &str) -> Result<String, AppError> {
    args_id
        .map(str::to_string)
        .ok_or_else(|| AppError::Usage(format!("--id is required to identify the {noun}")))
}

fn stub_workflow(namespace: &str, name: &str) -> Workflow {
    Workflow {
        namespace: namespace.to_string(),
        name: name.to_string(),
        version: CLI_VERSION.to_string(),
        source: SourceRef {
            repository_url: String::new(),
            branch: String::new(),
            token: None,
            project_id: None,
        },
        stages: Vec::<Stage>::new(),
    }
}

fn warn_on_version_mismatch(workflow: &Workflow) {
    if workflow.version != CLI_VERSION {
        output::warn(&format!(
            "workflow declares version '{}', CLI is '{}' (spec §9 open question ii: not a hard failure)",
            workflow.version, CLI_VERSION
        ));
    }
}

#[instrument(skip(args))]
pub async fn create_or_update_workflow(args: WorkflowArgs) -> Result<(), AppError> {
    let Some(path) = &args.file else {
        return Err(AppError::Usage("create/update workflow requires --file".to_string()));
    };
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| AppError::Usage(format!("could not read {}: {e}", path.display())))?;

    let cli_workflow_name = args
        .id
        .clone()
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .ok_or_else(|| AppError::Usage("could not derive a workflow name; pass --id".to_string()))?;

    let client = live_client().await?;
    let known_secrets = known_secret_names(&client, &args.namespace).await?;

    let params = LoadParams {
        namespace: &args.namespace,
        cli_workflow_name: &cli_workflow_name,
        branch_override: args.branch.as_deref(),
        token: args.token.as_deref(),
        project_id_override: None,
        known_secrets: &known_secrets,
        source_root: None,
    };
    let workflow = load_workflow(&yaml, &params)?;
    warn_on_version_mismatch(&workflow);

    if args.check {
        output::success(&format!("workflow '{}' is valid", workflow.name));
        return Ok(());
    }

    let fetcher = kubestage_scm::fetcher_for_host(&workflow.source.repository_url, reqwest::Client::new())?;
    let executor = Executor::new(client, fetcher);
    executor.run(&workflow, cancellation_on_ctrl_c()).await?;

    output::success(&format!("workflow '{}' completed", workflow.name));
    Ok(())
}

#[instrument(skip(args))]
pub async fn delete_workflow(args: WorkflowArgs) -> Result<(), AppError> {
    let id = required_id(args.id.as_deref(), "workflow")?;
    let client = live_client().await?;
    // `Executor::delete` never touches the fetcher; any host resolves
    // here since the source-fetcher contract doesn't hit the network
    // until `tarball_url` is actually called.
    let fetcher = kubestage_scm::fetcher_for_host("octo/placeholder", reqwest::Client::new())?;
    let executor = Executor::new(client, fetcher);
    let workflow = stub_workflow(&args.namespace, &id);
    // A standalone `delete` has no record of whether this run created
    // the namespace, so it never takes the namespace down with it.
    executor.delete(&workflow, false).await?;
    output::success(&format!("workflow '{id}' deleted"));
    Ok(())
}

#[instrument(skip(args))]
pub async fn get_workflow(args: WorkflowArgs) -> Result<(), AppError> {
    let id = required_id(args.id.as_deref(), "workflow")?;
    let client = live_client().await?;
    let selector = format!("workflow={id}");

    let mut rows = Vec::new();
    for kind in [Kind::Job, Kind::Deployment, Kind::Service, Kind::Ingress, Kind::CronJob] {
        for obj in client.list(kind, &args.namespace, &selector).await? {
            rows.push(vec![kind.to_string(), obj.name(), status_of(&obj)]);
        }
    }
    output::table(&["KIND", "NAME", "STATUS"], &rows);

    if args.logs {
        let pods = client.list(Kind::Pod, &args.namespace, &selector).await?;
        if let Some(pod) = pods.first() {
            let logs = client.read_pod_logs(&args.namespace, &pod.name(), "main").await?;
            println!("{logs}");
        } else {
            output::warn("no pod found for --logs");
        }
    }
    Ok(())
}

#[instrument(skip(args))]
pub async fn get_workflows(args: ListArgs) -> Result<(), AppError> {
    let client = live_client().await?;
    let jobs = client.list(Kind::Job, &args.namespace, "").await?;
    let deployments = client.list(Kind::Deployment, &args.namespace, "").await?;

    let mut names = BTreeSet::new();
    for obj in jobs.iter().chain(deployments.iter()) {
        if let Some(name) = obj.labels().get("workflow") {
            names.insert(name.clone());
        }
    }
    let rows: Vec<Vec<String>> = names.into_iter().map(|n| vec![n]).collect();
    output::table(&["WORKFLOW"], &rows);
    Ok(())
}

fn status_of(obj: &ManagedObject) -> String {
    match obj {
        ManagedObject::Job(job) => job
            .status
            .as_ref()
            .map(|s| {
                if s.succeeded.unwrap_or(0) > 0 {
                    "Succeeded".to_string()
                } else if s.failed.unwrap_or(0) > 0 {
                    "Failed".to_string()
                } else {
                    "Running".to_string()
                }
            })
            .unwrap_or_else(|| "Pending".to_string()),
        ManagedObject::Deployment(d) => d
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .map(|n| format!("{n} available"))
            .unwrap_or_else(|| "Pending".to_string()),
        _ => "-".to_string(),
    }
}

#[instrument(skip(args))]
pub async fn create_or_update_cw(args: CronWorkflowArgs) -> Result<(), AppError> {
    let Some(path) = &args.file else {
        return Err(AppError::Usage("create/update cw requires --file".to_string()));
    };
    let Some(schedule) = &args.schedule else {
        return Err(AppError::Usage("create/update cw requires --schedule".to_string()));
    };
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| AppError::Usage(format!("could not read {}: {e}", path.display())))?;

    let cli_workflow_name = args
        .id
        .clone()
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .ok_or_else(|| AppError::Usage("could not derive a workflow name; pass --id".to_string()))?;

    let client = live_client().await?;
    let known_secrets = known_secret_names(&client, &args.namespace).await?;
    let params = LoadParams {
        namespace: &args.namespace,
        cli_workflow_name: &cli_workflow_name,
        branch_override: args.branch.as_deref(),
        token: args.token.as_deref(),
        project_id_override: None,
        known_secrets: &known_secrets,
        source_root: None,
    };
    let workflow = load_workflow(&yaml, &params)?;
    let cron = CronWorkflow { workflow, schedule: schedule.clone() };

    if args.check {
        output::success(&format!("cron workflow '{}' is valid", cron.workflow.name));
        return Ok(());
    }

    let cronjob = kubestage_engine::synthesize_cronjob(&cron);
    client
        .ensure(&args.namespace, ManagedObject::CronJob(Box::new(cronjob)))
        .await?;
    output::success(&format!("cron workflow '{}' scheduled '{}'", cron.workflow.name, cron.schedule));
    Ok(())
}

#[instrument(skip(args))]
pub async fn delete_cw(args: CronWorkflowArgs) -> Result<(), AppError> {
    let id = required_id(args.id.as_deref(), "cron workflow")?;
    let client = live_client().await?;
    client.delete(Kind::CronJob, &args.namespace, &id).await?;
    output::success(&format!("cron workflow '{id}' deleted"));
    Ok(())
}

#[instrument(skip(args))]
pub async fn get_cw(args: CronWorkflowArgs) -> Result<(), AppError> {
    let id = required_id(args.id.as_deref(), "cron workflow")?;
    let client = live_client().await?;
    match client.get(Kind::CronJob, &args.namespace, &id).await? {
        Some(ManagedObject::CronJob(cw)) => {
            let schedule = cw.spec.as_ref().map(|s| s.schedule.clone()).unwrap_or_default();
            output::table(&["NAME", "SCHEDULE"], &[vec![id, schedule]]);
        }
        _ => output::warn(&format!("cron workflow '{id}' not found")),
    }
    Ok(())
}

#[instrument(skip(args))]
pub async fn create_or_update_secret(args: SecretArgs) -> Result<(), AppError> {
    let Some(path) = &args.file else {
        return Err(AppError::Usage("create/update secret requires --file".to_string()));
    };
    let secret = secretfile::build_secret(path, &args.namespace, &args.id)?;
    let client = live_client().await?;
    client.ensure(&args.namespace, ManagedObject::Secret(Box::new(secret))).await?;
    output::success(&format!("secret '{}' ensured", args.id));
    Ok(())
}

#[instrument(skip(args))]
pub async fn delete_secret(args: SecretArgs) -> Result<(), AppError> {
    let client = live_client().await?;
    client.delete(Kind::Secret, &args.namespace, &args.id).await?;
    output::success(&format!("secret '{}' deleted", args.id));
    Ok(())
}

#[instrument(skip(args))]
pub async fn get_secret(args: SecretArgs) -> Result<(), AppError> {
    let client = live_client().await?;
    match client.get(Kind::Secret, &args.namespace, &args.id).await? {
        Some(ManagedObject::Secret(secret)) => {
            let type_ = secret.type_.clone().unwrap_or_default();
            let keys = secret
                .data
                .as_ref()
                .map(|d| d.keys().cloned().collect::<Vec<_>>().join(","))
                .unwrap_or_default();
            output::table(&["NAME", "TYPE", "KEYS"], &[vec![args.id, type_, keys]]);
        }
        _ => output::warn(&format!("secret '{}' not found", args.id)),
    }
    Ok(())
}

#[instrument(skip(args))]
pub async fn get_secrets(args: ListArgs) -> Result<(), AppError> {
    let client = live_client().await?;
    let secrets = client.list(Kind::Secret, &args.namespace, "").await?;
    let rows: Vec<Vec<String>> = secrets.iter().map(|obj| vec![obj.name()]).collect();
    output::table(&["SECRET"], &rows);
    Ok(())
}
