//! Secret config file decode (spec §3 "Secret"): a small YAML document
//! naming the secret's kind and data, turned directly into the
//! Kubernetes object the `ClusterClient` ensures. Unlike workflows,
//! secrets have no separate validated model type — they are a thin
//! pass-through to the cluster.

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretFile {
    kind: SecretFileKind,
    data: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum SecretFileKind {
    Opaque,
    DockerRegistry,
}

pub fn build_secret(path: &Path, namespace: &str, name: &str) -> Result<Secret, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Usage(format!("could not read secret file {}: {e}", path.display())))?;
    let file: SecretFile = serde_yaml::from_str(&raw)
        .map_err(|e| AppError::Usage(format!("invalid secret file {}: {e}", path.display())))?;

    let (type_, data) = match file.kind {
        SecretFileKind::Opaque => ("Opaque", file.data),
        SecretFileKind::DockerRegistry => {
            if !file.data.contains_key(".dockerconfigjson") {
                return Err(AppError::Usage(
                    "docker-registry secrets require a `.dockerconfigjson` data key".to_string(),
                ));
            }
            ("kubernetes.io/dockerconfigjson", file.data)
        }
    };

    let data = data.into_iter().map(|(k, v)| (k, ByteString(v.into_bytes()))).collect();

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some(type_.to_string()),
        data: Some(data),
        ..Default::default()
    })
}
