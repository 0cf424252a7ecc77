//! Phase 2 (normalization/defaults) and phase 3 (semantic validation) of
//! the Config Loader & Validator (spec §4.1).

use crate::error::{ConfigError, Result};
use crate::normalize::normalize;
use crate::raw::{self, RawConfig, RawStep};
use crate::types::{
    ServiceConfig, ServiceStep, SourceRef, Stage, StepCommon, TaskStep, Workflow,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

/// Everything the loader needs that does not live in the YAML document
/// itself: CLI-supplied overrides (spec §6 global options) and the
/// caller's view of what already exists on the cluster.
pub struct LoadParams<'a> {
    pub namespace: &'a str,
    /// The workflow name supplied on the CLI (`create workflow <name>`);
    /// used when the config omits `name` (spec §4.1: "name ... defaults to
    /// workflow CLI name").
    pub cli_workflow_name: &'a str,
    pub branch_override: Option<&'a str>,
    pub token: Option<&'a str>,
    pub project_id_override: Option<&'a str>,
    /// Secret names already present in the target namespace (spec §3:
    /// "every secret name referenced must already exist... at submission
    /// time").
    pub known_secrets: &'a BTreeSet<String>,
    /// Root of the fetched source tree, used to check that
    /// `path_to_executable` / `dependency_path` exist. `None` skips the
    /// file-existence check (used by callers that validate schema only).
    pub source_root: Option<&'a Path>,
}

/// Runs the full three-phase pipeline: structural decode, normalization
/// with defaults, semantic validation.
pub fn load_workflow(yaml: &str, params: &LoadParams<'_>) -> Result<Workflow> {
    let raw: RawConfig = raw::parse(yaml)?;
    debug!(version = %raw.version, "structural decode ok");

    if raw.stages.is_empty() {
        return Err(ConfigError::ConfigSchemaError(
            "workflow must declare at least one stage".to_string(),
        ));
    }

    let name = normalize(raw.name.as_deref().unwrap_or(params.cli_workflow_name));
    if name.is_empty() {
        return Err(ConfigError::ConfigSchemaError(
            "workflow name normalizes to an empty string".to_string(),
        ));
    }

    let source = build_source(&raw, params)?;

    let mut stages = Vec::with_capacity(raw.stages.len());
    let mut seen_stage_names: HashMap<String, String> = HashMap::new();
    // Tracked across the whole workflow, not reset per stage: two stages
    // sharing a step name is rejected (spec open question iii).
    let mut seen_step_names: HashMap<String, String> = HashMap::new();
    for (raw_stage_name, raw_steps) in &raw.stages {
        let stage_name = normalize(raw_stage_name);
        if let Some(existing) = seen_stage_names.insert(stage_name.clone(), raw_stage_name.clone())
        {
            return Err(ConfigError::NameCollisionError {
                a: existing,
                b: raw_stage_name.clone(),
                normalized: stage_name,
            });
        }

        if raw_steps.is_empty() {
            return Err(ConfigError::ConfigSchemaError(format!(
                "stage '{raw_stage_name}' has no steps"
            )));
        }

        let mut steps = Vec::with_capacity(raw_steps.len());
        for raw_step in raw_steps {
            let step = build_step(raw_step, params)?;
            let step_name = step.name().to_string();
            if let Some(existing) =
                seen_step_names.insert(step_name.clone(), raw_step.name.clone())
            {
                return Err(ConfigError::NameCollisionError {
                    a: existing,
                    b: raw_step.name.clone(),
                    normalized: step_name,
                });
            }
            steps.push(step);
        }

        debug!(stage = %stage_name, steps = steps.len(), "stage normalized");
        stages.push(Stage {
            name: stage_name,
            steps,
        });
    }

    debug!(workflow = %name, stages = stages.len(), "validation ok");
    Ok(Workflow {
        namespace: params.namespace.to_string(),
        name,
        version: raw.version,
        source,
        stages,
    })
}

fn build_source(raw: &RawConfig, params: &LoadParams<'_>) -> Result<SourceRef> {
    let repository_url = raw
        .source
        .as_ref()
        .and_then(|s| s.repository_url.clone())
        .ok_or_else(|| {
            ConfigError::ConfigSchemaError("source.repository_url is required".to_string())
        })?;

    let branch = params
        .branch_override
        .map(str::to_string)
        .or_else(|| raw.source.as_ref().and_then(|s| s.branch.clone()))
        .unwrap_or_else(|| "main".to_string());

    let project_id = params
        .project_id_override
        .map(str::to_string)
        .or_else(|| raw.source.as_ref().and_then(|s| s.project_id.clone()));

    Ok(SourceRef {
        repository_url,
        branch,
        token: params.token.map(str::to_string),
        project_id,
    })
}

fn build_step(raw: &RawStep, params: &LoadParams<'_>) -> Result<crate::types::Step> {
    let name = normalize(&raw.name);
    if name.is_empty() {
        return Err(ConfigError::ConfigSchemaError(format!(
            "step '{}' normalizes to an empty name",
            raw.name
        )));
    }

    if !(raw.path_to_executable.ends_with(".py") || raw.path_to_executable.ends_with(".ipynb")) {
        return Err(ConfigError::ConfigSchemaError(format!(
            "step '{}': path_to_executable must end in .py or .ipynb",
            raw.name
        )));
    }
    if !raw.dependency_path.ends_with(".txt") {
        return Err(ConfigError::ConfigSchemaError(format!(
            "step '{}': dependency_path must end in .txt",
            raw.name
        )));
    }
    if raw.cpu_request <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "step '{}': cpu_request must be > 0",
            raw.name
        )));
    }
    if raw.memory_request == 0 {
        return Err(ConfigError::ValidationError(format!(
            "step '{}': memory_request must be > 0",
            raw.name
        )));
    }
    if raw.polling_interval < 1 {
        return Err(ConfigError::ValidationError(format!(
            "step '{}': polling_interval must be >= 1",
            raw.name
        )));
    }
    if raw.timeout < raw.polling_interval {
        return Err(ConfigError::ValidationError(format!(
            "step '{}': timeout must be >= polling_interval",
            raw.name
        )));
    }

    for secret in &raw.secrets {
        if !params.known_secrets.contains(secret) {
            return Err(ConfigError::SecretNotFoundError {
                namespace: params.namespace.to_string(),
                name: secret.clone(),
            });
        }
    }

    if let Some(root) = params.source_root {
        if !root.join(&raw.path_to_executable).exists() {
            return Err(ConfigError::MissingFileError(raw.path_to_executable.clone()));
        }
        if !root.join(&raw.dependency_path).exists() {
            return Err(ConfigError::MissingFileError(raw.dependency_path.clone()));
        }
    }

    let common = StepCommon {
        name,
        path_to_executable: raw.path_to_executable.clone(),
        dependency_path: raw.dependency_path.clone(),
        image: raw.image.clone(),
        entrypoint: raw.entrypoint.clone(),
        envs: raw.envs.clone(),
        secrets: raw.secrets.clone(),
        cpu_millicores: (raw.cpu_request * 1000.0).round() as u32,
        memory_request_mb: raw.memory_request,
        timeout_secs: raw.timeout,
        polling_interval_secs: raw.polling_interval,
        warm_up_secs: raw.warm_up,
    };

    match &raw.service {
        None => {
            if raw.replicas.is_some()
                || raw.revision_history_limit.is_some()
                || raw.min_ready_seconds.is_some()
            {
                return Err(ConfigError::ConfigSchemaError(format!(
                    "step '{}': service-only fields set without a 'service' block",
                    raw.name
                )));
            }
            Ok(crate::types::Step::Task(TaskStep {
                common,
                backoff_limit: raw.backoff_limit.unwrap_or(0),
            }))
        }
        Some(raw_service) => {
            if raw.backoff_limit.is_some() {
                return Err(ConfigError::ConfigSchemaError(format!(
                    "step '{}': backoff_limit is task-only but a 'service' block is present",
                    raw.name
                )));
            }
            Ok(crate::types::Step::Service(ServiceStep {
                common,
                replicas: raw.replicas.unwrap_or(1),
                revision_history_limit: raw.revision_history_limit.unwrap_or(1),
                min_ready_secs: raw.min_ready_seconds.unwrap_or(0),
                service: ServiceConfig {
                    port: raw_service.port,
                    ingress: raw_service.ingress,
                    max_startup_secs: raw_service.max_startup_time,
                },
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn params<'a>(known: &'a BTreeSet<String>) -> LoadParams<'a> {
        LoadParams {
            namespace: "ml-team",
            cli_workflow_name: "fallback-name",
            branch_override: None,
            token: None,
            project_id_override: None,
            known_secrets: known,
            source_root: None,
        }
    }

    const MINIMAL_TASK: &str = r#"
version: "1.0.0"
name: pipeline
source:
  repository_url: "https://github.com/acme/models"
stages:
  train:
    - name: sarimax
      path_to_executable: train.py
      dependency_path: requirements.txt
      cpu_request: 0.5
      memory_request: 500
"#;

    #[test]
    fn loads_a_minimal_task_workflow() {
        let known = BTreeSet::new();
        let wf = load_workflow(MINIMAL_TASK, &params(&known)).unwrap();
        assert_eq!(wf.name, "pipeline");
        assert_eq!(wf.stages.len(), 1);
        assert_eq!(wf.stages[0].name, "train");
        let crate::types::Step::Task(task) = &wf.stages[0].steps[0] else {
            panic!("expected task step");
        };
        assert_eq!(task.common.timeout_secs, 20);
        assert_eq!(task.common.polling_interval_secs, 1);
        assert_eq!(task.backoff_limit, 0);
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let yaml = format!("{MINIMAL_TASK}\nbogus: true\n");
        let known = BTreeSet::new();
        assert!(matches!(
            load_workflow(&yaml, &params(&known)),
            Err(ConfigError::ConfigParseError(_))
        ));
    }

    #[test]
    fn rejects_service_config_on_task_step() {
        let yaml = r#"
version: "1.0.0"
name: pipeline
source:
  repository_url: "https://github.com/acme/models"
stages:
  train:
    - name: sarimax
      path_to_executable: train.py
      dependency_path: requirements.txt
      cpu_request: 0.5
      memory_request: 500
      replicas: 2
"#;
        let known = BTreeSet::new();
        assert!(matches!(
            load_workflow(yaml, &params(&known)),
            Err(ConfigError::ConfigSchemaError(_))
        ));
    }

    #[test]
    fn rejects_wrong_executable_suffix() {
        let yaml = MINIMAL_TASK.replace("train.py", "train.sh");
        let known = BTreeSet::new();
        assert!(matches!(
            load_workflow(&yaml, &params(&known)),
            Err(ConfigError::ConfigSchemaError(_))
        ));
    }

    #[test]
    fn rejects_missing_secret() {
        let yaml = MINIMAL_TASK.replace(
            "      memory_request: 500",
            "      memory_request: 500\n      secrets: [\"api-key\"]",
        );
        let known = BTreeSet::new();
        assert!(matches!(
            load_workflow(&yaml, &params(&known)),
            Err(ConfigError::SecretNotFoundError { .. })
        ));
    }

    #[test]
    fn accepts_known_secret() {
        let yaml = MINIMAL_TASK.replace(
            "      memory_request: 500",
            "      memory_request: 500\n      secrets: [\"api-key\"]",
        );
        let mut known = BTreeSet::new();
        known.insert("api-key".to_string());
        assert!(load_workflow(&yaml, &params(&known)).is_ok());
    }

    #[test]
    fn rejects_duplicate_step_names_in_a_stage() {
        let yaml = r#"
version: "1.0.0"
name: pipeline
source:
  repository_url: "https://github.com/acme/models"
stages:
  train:
    - name: sarimax
      path_to_executable: train.py
      dependency_path: requirements.txt
      cpu_request: 0.5
      memory_request: 500
    - name: Sarimax
      path_to_executable: train2.py
      dependency_path: requirements.txt
      cpu_request: 0.5
      memory_request: 500
"#;
        let known = BTreeSet::new();
        assert!(matches!(
            load_workflow(yaml, &params(&known)),
            Err(ConfigError::NameCollisionError { .. })
        ));
    }

    #[test]
    fn service_step_requires_service_block() {
        let yaml = r#"
version: "1.0.0"
name: pipeline
source:
  repository_url: "https://github.com/acme/models"
stages:
  serve:
    - name: api
      path_to_executable: serve.py
      dependency_path: requirements.txt
      cpu_request: 1
      memory_request: 1000
      replicas: 2
"#;
        let known = BTreeSet::new();
        assert!(matches!(
            load_workflow(yaml, &params(&known)),
            Err(ConfigError::ConfigSchemaError(_))
        ));
    }

    #[test]
    fn loads_a_service_step_with_defaults() {
        let yaml = r#"
version: "1.0.0"
name: pipeline
source:
  repository_url: "https://github.com/acme/models"
stages:
  serve:
    - name: api
      path_to_executable: serve.py
      dependency_path: requirements.txt
      cpu_request: 1
      memory_request: 1000
      service: {}
"#;
        let known = BTreeSet::new();
        let wf = load_workflow(yaml, &params(&known)).unwrap();
        let crate::types::Step::Service(svc) = &wf.stages[0].steps[0] else {
            panic!("expected service step");
        };
        assert_eq!(svc.replicas, 1);
        assert_eq!(svc.revision_history_limit, 1);
        assert_eq!(svc.service.port, 5000);
        assert!(!svc.service.ingress);
    }

    #[test]
    fn accepts_a_source_root_containing_both_referenced_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train.py"), "# training entrypoint").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "pandas").unwrap();

        let mut p = params(&BTreeSet::new());
        p.source_root = Some(dir.path());
        assert!(load_workflow(MINIMAL_TASK, &p).is_ok());
    }

    #[test]
    fn rejects_a_source_root_missing_the_dependency_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train.py"), "# training entrypoint").unwrap();

        let mut p = params(&BTreeSet::new());
        p.source_root = Some(dir.path());
        assert!(matches!(
            load_workflow(MINIMAL_TASK, &p),
            Err(ConfigError::MissingFileError(ref f)) if f == "requirements.txt"
        ));
    }
}
