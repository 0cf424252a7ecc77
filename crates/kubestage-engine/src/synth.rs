//! Resource Synthesizer (spec §4.2): maps one validated step to the
//! Kubernetes objects that realize it. Pure and deterministic — no
//! cluster I/O here, so it can be unit-tested against the fake client
//! and property-tested for determinism (spec §8 invariant 1) without a
//! network in sight. Grounded on the teacher's pod-template and
//! resource-builder shape in
//! `examples/5dlabs-cto/controller/src/tasks/code/resources.rs`.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvFromSource, EnvVar, LocalObjectReference, PodSpec,
    PodTemplateSpec, ResourceRequirements, SecretEnvSource, Service, ServicePort, ServiceSpec,
    Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use kubestage_model::{SecretKind, SecretRef, ServiceStep, Stage, Step, StepCommon, TaskStep, Workflow};

use crate::naming::bundle_name;

const DEFAULT_RUNNER_IMAGE: &str = "ghcr.io/kubestage/runner:latest";
const SOURCE_VOLUME: &str = "source";
const SOURCE_MOUNT_PATH: &str = "/home/app";

/// Resolved once per workflow (not per step) before synthesis begins, so
/// the synthesizer itself stays a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct SourceProvisioning {
    pub tarball_url: String,
    pub archive_root_prefix: String,
    pub private: bool,
}

/// The object set produced for one step (spec §4.2 "bundle").
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub job: Option<Job>,
    pub deployment: Option<Deployment>,
    pub service: Option<Service>,
    pub ingress: Option<Ingress>,
}

#[must_use]
pub fn shared_labels(workflow: &str, stage: &str, step: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("workflow".to_string(), workflow.to_string());
    labels.insert("stage".to_string(), stage.to_string());
    labels.insert("step".to_string(), step.to_string());
    labels
}

#[must_use]
pub fn synthesize_step(
    workflow: &Workflow,
    stage: &Stage,
    step: &Step,
    source: &SourceProvisioning,
    known_secrets: &[SecretRef],
) -> Bundle {
    let name = bundle_name(&workflow.name, &stage.name, step.name());
    let mut labels = shared_labels(&workflow.name, &stage.name, step.name());

    match step {
        Step::Task(task) => {
            labels.insert("app".to_string(), step.name().to_string());
            let pod_template = pod_template(&workflow.name, &name, labels.clone(), &task.common, source, known_secrets);
            Bundle {
                job: Some(task_job(&name, &workflow.namespace, labels, task, pod_template)),
                ..Default::default()
            }
        }
        Step::Service(svc) => {
            labels.insert("app".to_string(), step.name().to_string());
            let pod_template = pod_template(&workflow.name, &name, labels.clone(), &svc.common, source, known_secrets);
            let deployment = service_deployment(&name, &workflow.namespace, labels.clone(), svc, pod_template);
            let service = cluster_ip_service(&name, &workflow.namespace, labels.clone(), svc);
            let ingress = svc
                .service
                .ingress
                .then(|| step_ingress(&name, &workflow.namespace, labels.clone(), &workflow.name, step.name(), svc.service.port));
            Bundle {
                deployment: Some(deployment),
                service: Some(service),
                ingress,
                ..Default::default()
            }
        }
    }
}

fn object_meta(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels.into_iter().collect()),
        ..Default::default()
    }
}

fn pod_template(
    workflow_name: &str,
    bundle_name: &str,
    pod_labels: BTreeMap<String, String>,
    common: &StepCommon,
    source: &SourceProvisioning,
    known_secrets: &[SecretRef],
) -> PodTemplateSpec {
    let referenced: Vec<&SecretRef> = known_secrets
        .iter()
        .filter(|s| common.secrets.contains(&s.name))
        .collect();

    let env_from: Vec<EnvFromSource> = referenced
        .iter()
        .filter(|s| matches!(s.kind, SecretKind::Opaque(_)))
        .map(|s| EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: s.name.clone(),
                optional: Some(false),
            }),
            ..Default::default()
        })
        .collect();

    let image_pull_secrets: Vec<LocalObjectReference> = referenced
        .iter()
        .filter(|s| matches!(s.kind, SecretKind::DockerRegistry { .. }))
        .map(|s| LocalObjectReference { name: Some(s.name.clone()) })
        .collect();

    let env: Vec<EnvVar> = common
        .envs
        .iter()
        .map(|(k, v)| EnvVar {
            name: k.clone(),
            value: Some(v.clone()),
            ..Default::default()
        })
        .collect();

    let command = common
        .entrypoint
        .clone()
        .map(|e| vec!["sh".to_string(), "-c".to_string(), e])
        .unwrap_or_else(|| canonical_launcher(common));

    let main_container = Container {
        name: "main".to_string(),
        image: Some(common.image.clone().unwrap_or_else(|| DEFAULT_RUNNER_IMAGE.to_string())),
        command: Some(command),
        working_dir: Some(SOURCE_MOUNT_PATH.to_string()),
        env: Some(env),
        env_from: Some(env_from),
        resources: Some(ResourceRequirements {
            requests: Some(
                [
                    ("cpu".to_string(), quantity_millicores(common.cpu_millicores)),
                    ("memory".to_string(), quantity_mebibytes(common.memory_request_mb)),
                ]
                .into_iter()
                .collect(),
            ),
            limits: None,
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: SOURCE_VOLUME.to_string(),
            mount_path: SOURCE_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let mut init_env = vec![
        EnvVar {
            name: "TARBALL_URL".to_string(),
            value: Some(source.tarball_url.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "ARCHIVE_ROOT_PREFIX".to_string(),
            value: Some(source.archive_root_prefix.clone()),
            ..Default::default()
        },
    ];
    let mut init_env_from = Vec::new();
    if source.private {
        init_env_from.push(EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: crate::naming::repo_secret_name(workflow_name),
                optional: Some(false),
            }),
            ..Default::default()
        });
    }
    init_env.push(EnvVar {
        name: "BUNDLE_NAME".to_string(),
        value: Some(bundle_name.to_string()),
        ..Default::default()
    });

    let init_container = Container {
        name: "fetch-source".to_string(),
        image: Some(DEFAULT_RUNNER_IMAGE.to_string()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!(
                "curl -sSL -o /tmp/src.tar.gz \"$TARBALL_URL\"${{GITHUB_TOKEN:+ -H \"Authorization: Bearer $GITHUB_TOKEN\"}} && \
                 tar -xzf /tmp/src.tar.gz -C {SOURCE_MOUNT_PATH} --strip-components=1"
            ),
        ]),
        env: Some(init_env),
        env_from: Some(init_env_from),
        volume_mounts: Some(vec![VolumeMount {
            name: SOURCE_VOLUME.to_string(),
            mount_path: SOURCE_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels.into_iter().collect()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            init_containers: Some(vec![init_container]),
            containers: vec![main_container],
            volumes: Some(vec![Volume {
                name: SOURCE_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }]),
            image_pull_secrets: if image_pull_secrets.is_empty() {
                None
            } else {
                Some(image_pull_secrets)
            },
            ..Default::default()
        }),
    }
}

/// The canonical launcher: installs dependencies, then runs the step's
/// executable (notebooks run through a headless exec shim).
fn canonical_launcher(common: &StepCommon) -> Vec<String> {
    let run = if common.path_to_executable.ends_with(".ipynb") {
        format!("jupyter nbconvert --to notebook --execute --output /tmp/out.ipynb {}", common.path_to_executable)
    } else {
        format!("python {}", common.path_to_executable)
    };
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("pip install -r {} && {run}", common.dependency_path),
    ]
}

fn quantity_millicores(millicores: u32) -> k8s_openapi::apimachinery::pkg::api::resource::Quantity {
    k8s_openapi::apimachinery::pkg::api::resource::Quantity(format!("{millicores}m"))
}

fn quantity_mebibytes(mebibytes: u32) -> k8s_openapi::apimachinery::pkg::api::resource::Quantity {
    k8s_openapi::apimachinery::pkg::api::resource::Quantity(format!("{mebibytes}Mi"))
}

fn task_job(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    task: &TaskStep,
    mut pod_template: PodTemplateSpec,
) -> Job {
    pod_template.spec.as_mut().expect("pod spec always set").restart_policy = Some("Never".to_string());
    Job {
        metadata: object_meta(name, namespace, labels),
        spec: Some(JobSpec {
            backoff_limit: Some(task.backoff_limit as i32),
            template: pod_template,
            ..Default::default()
        }),
        status: None,
    }
}

fn service_deployment(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    svc: &ServiceStep,
    mut pod_template: PodTemplateSpec,
) -> Deployment {
    pod_template.spec.as_mut().expect("pod spec always set").restart_policy = Some("Always".to_string());
    let selector = LabelSelector {
        match_labels: Some([("app".to_string(), svc.common.name.clone())].into_iter().collect()),
        ..Default::default()
    };
    Deployment {
        metadata: object_meta(name, namespace, labels),
        spec: Some(DeploymentSpec {
            replicas: Some(svc.replicas as i32),
            min_ready_seconds: Some(svc.min_ready_secs as i32),
            revision_history_limit: Some(svc.revision_history_limit as i32),
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment::default()),
            }),
            selector,
            template: pod_template,
            ..Default::default()
        }),
        status: None,
    }
}

fn cluster_ip_service(name: &str, namespace: &str, labels: BTreeMap<String, String>, svc: &ServiceStep) -> Service {
    Service {
        metadata: object_meta(name, namespace, labels),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some([("app".to_string(), svc.common.name.clone())].into_iter().collect()),
            ports: Some(vec![ServicePort {
                port: i32::from(svc.service.port),
                target_port: Some(IntOrString::Int(i32::from(svc.service.port))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

fn step_ingress(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    workflow_name: &str,
    step_name: &str,
    port: u16,
) -> Ingress {
    let host = format!("{step_name}.{workflow_name}.{namespace}.local");
    Ingress {
        metadata: object_meta(name, namespace, labels),
        spec: Some(IngressSpec {
            ingress_class_name: Some("nginx".to_string()),
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(i32::from(port)),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Every referenced secret that is a union of envs + data-field keys, as
/// used by invariant 2's label check.
#[must_use]
pub fn referenced_secret_names(common: &StepCommon) -> BTreeSet<String> {
    common.secrets.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubestage_model::{ServiceConfig, SourceRef};

    fn workflow_with(stage: Stage) -> Workflow {
        Workflow {
            namespace: "ml-team".to_string(),
            name: "pipeline".to_string(),
            version: "1.0.0".to_string(),
            source: SourceRef {
                repository_url: "https://github.com/acme/models".to_string(),
                branch: "main".to_string(),
                token: None,
                project_id: None,
            },
            stages: vec![stage],
        }
    }

    fn common(name: &str) -> StepCommon {
        StepCommon {
            name: name.to_string(),
            path_to_executable: "train.py".to_string(),
            dependency_path: "requirements.txt".to_string(),
            image: None,
            entrypoint: None,
            envs: BTreeMap::new(),
            secrets: BTreeSet::new(),
            cpu_millicores: 500,
            memory_request_mb: 500,
            timeout_secs: 30,
            polling_interval_secs: 2,
            warm_up_secs: 0,
        }
    }

    fn no_source() -> SourceProvisioning {
        SourceProvisioning {
            tarball_url: "https://api.github.com/repos/acme/models/tarball/main".to_string(),
            archive_root_prefix: "acme-models-abc1234".to_string(),
            private: false,
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        let stage = Stage {
            name: "train".to_string(),
            steps: vec![Step::Task(TaskStep { common: common("sarimax"), backoff_limit: 0 })],
        };
        let workflow = workflow_with(stage.clone());
        let source = no_source();

        let first = synthesize_step(&workflow, &stage, &stage.steps[0], &source, &[]);
        let second = synthesize_step(&workflow, &stage, &stage.steps[0], &source, &[]);

        assert_eq!(
            serde_json::to_vec(&first.job).unwrap(),
            serde_json::to_vec(&second.job).unwrap()
        );
    }

    #[test]
    fn task_step_synthesizes_exactly_one_job_and_nothing_else() {
        let stage = Stage {
            name: "train".to_string(),
            steps: vec![Step::Task(TaskStep { common: common("sarimax"), backoff_limit: 0 })],
        };
        let workflow = workflow_with(stage.clone());
        let bundle = synthesize_step(&workflow, &stage, &stage.steps[0], &no_source(), &[]);

        assert!(bundle.job.is_some());
        assert!(bundle.deployment.is_none());
        assert!(bundle.service.is_none());
        assert!(bundle.ingress.is_none());
    }

    #[test]
    fn service_step_without_ingress_synthesizes_deployment_and_service_only() {
        let step = ServiceStep {
            common: common("api"),
            replicas: 2,
            revision_history_limit: 1,
            min_ready_secs: 5,
            service: ServiceConfig { port: 8080, ingress: false, max_startup_secs: None },
        };
        let stage = Stage { name: "serve".to_string(), steps: vec![Step::Service(step)] };
        let workflow = workflow_with(stage.clone());
        let bundle = synthesize_step(&workflow, &stage, &stage.steps[0], &no_source(), &[]);

        assert!(bundle.job.is_none());
        assert!(bundle.deployment.is_some());
        assert!(bundle.service.is_some());
        assert!(bundle.ingress.is_none());
    }

    #[test]
    fn service_step_with_ingress_synthesizes_exactly_one_of_each() {
        let step = ServiceStep {
            common: common("api"),
            replicas: 2,
            revision_history_limit: 1,
            min_ready_secs: 5,
            service: ServiceConfig { port: 8080, ingress: true, max_startup_secs: None },
        };
        let stage = Stage { name: "serve".to_string(), steps: vec![Step::Service(step)] };
        let workflow = workflow_with(stage.clone());
        let bundle = synthesize_step(&workflow, &stage, &stage.steps[0], &no_source(), &[]);

        assert!(bundle.deployment.is_some());
        assert!(bundle.service.is_some());
        assert!(bundle.ingress.is_some());

        let labels = &bundle.deployment.unwrap().metadata.labels.unwrap();
        assert_eq!(labels.get("workflow").map(String::as_str), Some("pipeline"));
        assert_eq!(labels.get("stage").map(String::as_str), Some("serve"));
        assert_eq!(labels.get("step").map(String::as_str), Some("api"));
    }

    #[test]
    fn service_deployment_selector_matches_its_own_pod_template_labels() {
        let step = ServiceStep {
            common: common("api"),
            replicas: 2,
            revision_history_limit: 1,
            min_ready_secs: 5,
            service: ServiceConfig { port: 8080, ingress: false, max_startup_secs: None },
        };
        let stage = Stage { name: "serve".to_string(), steps: vec![Step::Service(step)] };
        let workflow = workflow_with(stage.clone());
        let bundle = synthesize_step(&workflow, &stage, &stage.steps[0], &no_source(), &[]);

        let deployment = bundle.deployment.unwrap();
        let spec = deployment.spec.unwrap();
        let selector = spec.selector.match_labels.unwrap();
        let pod_labels = spec.template.metadata.unwrap().labels.unwrap();
        for (key, value) in &selector {
            assert_eq!(pod_labels.get(key), Some(value), "selector key {key} unmatched by pod template labels");
        }

        let service = bundle.service.unwrap();
        let service_selector = service.spec.unwrap().selector.unwrap();
        for (key, value) in &service_selector {
            assert_eq!(pod_labels.get(key), Some(value), "service selector key {key} unmatched by pod template labels");
        }

        assert_eq!(pod_labels.get("workflow").map(String::as_str), Some("pipeline"));
        assert_eq!(pod_labels.get("stage").map(String::as_str), Some("serve"));
        assert_eq!(pod_labels.get("step").map(String::as_str), Some("api"));
    }
}
