//! The engine-wide error taxonomy (spec §7): six kinds, each with a
//! stable exit-code mapping applied once, at the CLI's outer frame.

use thiserror::Error;

use kubestage_k8s::ClusterError;

/// One step's terminal failure, carried up through the Executor so the
/// CLI can print "names the failed step... includes its last log
/// lines" (spec §8 S2).
#[derive(Debug, Clone)]
pub struct StepFailureDetail {
    pub stage: String,
    pub step: String,
    pub reason: String,
    pub captured_logs: Option<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fails before stage 1 submission: missing secret, source fetch
    /// 401/404, unsupported Kubernetes version.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("stage '{stage}' failed: {}", summarize(failures))]
    StepFailure { stage: String, failures: Vec<StepFailureDetail> },

    #[error("stage '{stage}' timed out: {}", summarize(failures))]
    Timeout { stage: String, failures: Vec<StepFailureDetail> },

    /// RBAC denied or quota exceeded mid-stage: abort, sweep, surface
    /// the raw API message.
    #[error("fatal cluster error: {0}")]
    Fatal(String),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("cancelled by operator")]
    Cancelled,
}

fn summarize(failures: &[StepFailureDetail]) -> String {
    failures
        .iter()
        .map(|f| match &f.captured_logs {
            Some(logs) => format!("{} ({}):\n{}", f.step, f.reason, logs),
            None => format!("{} ({})", f.step, f.reason),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
