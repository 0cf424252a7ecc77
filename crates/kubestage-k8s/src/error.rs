//! Error taxonomy for the cluster client (spec §7: "Transient cluster" /
//! "Fatal" / precondition kinds flow through here before the Executor
//! classifies them).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("object not found: {kind} {namespace}/{name}")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("permission denied: {0}")]
    RbacDenied(String),

    #[error("resource quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Connection reset, 5xx, watch disconnect: retried with linear
    /// backoff by the caller before being promoted to a step failure.
    #[error("transient cluster error: {0}")]
    Transient(String),

    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = ClusterError> = std::result::Result<T, E>;

impl ClusterError {
    /// Classifies a raw `kube::Error` the way the live client does after
    /// every API call, so callers never match on `kube::Error` directly.
    #[must_use]
    pub fn from_kube(kind: &str, namespace: &str, name: &str, err: kube::Error) -> Self {
        if let kube::Error::Api(ref ae) = err {
            match ae.code {
                404 => {
                    return ClusterError::NotFound {
                        kind: kind.to_string(),
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    }
                }
                403 => return ClusterError::RbacDenied(ae.message.clone()),
                409 if ae.reason == "Conflict" && ae.message.contains("quota") => {
                    return ClusterError::QuotaExceeded(ae.message.clone())
                }
                500..=599 => return ClusterError::Transient(ae.message.clone()),
                _ => {}
            }
        }
        ClusterError::Api(err)
    }
}
