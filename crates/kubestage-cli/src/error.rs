//! The outer frame (spec §7): the only place an error becomes a
//! user-visible message and an exit code. Everything upstream
//! (`ConfigError`, `ScmError`, `ClusterError`, `EngineError`) stays a
//! typed value until it lands here.

use std::process::ExitCode;

use kubestage_engine::EngineError;
use kubestage_k8s::ClusterError;
use kubestage_model::ConfigError;
use kubestage_scm::ScmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scm(#[from] ScmError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cancelled by operator")]
    Cancelled,

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Maps every error kind onto the exit-code table in spec §6.
    /// `Precondition` and `Fatal` engine errors both surface as cluster
    /// errors here (3): the source material does not separate
    /// "never reached the cluster" from "the cluster rejected us"
    /// for exit-code purposes, and both abort before or during
    /// submission rather than because a step's workload failed.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        let code: u8 = match self {
            AppError::Config(_) => 2,
            AppError::Scm(_) => 2,
            AppError::Cluster(_) => 3,
            AppError::Engine(EngineError::Precondition(_)) => 3,
            AppError::Engine(EngineError::Fatal(_)) => 3,
            AppError::Engine(EngineError::Cluster(_)) => 3,
            AppError::Engine(EngineError::StepFailure { .. }) => 4,
            AppError::Engine(EngineError::Timeout { .. }) => 5,
            AppError::Engine(EngineError::Cancelled) => 6,
            AppError::Cancelled => 6,
            AppError::Usage(_) => 1,
            AppError::Other(_) => 1,
        };
        ExitCode::from(code)
    }
}
