//! Workflow data model, YAML loading, DNS-label normalization and
//! semantic validation (spec §3, §4.1).

mod error;
mod load;
mod normalize;
mod raw;
mod types;

pub use error::{ConfigError, Result};
pub use load::{load_workflow, LoadParams};
pub use normalize::{is_dns_label, normalize};
pub use types::{
    CronWorkflow, SecretKind, SecretRef, ServiceConfig, ServiceStep, SourceRef, Stage, Step,
    StepCommon, TaskStep, Workflow,
};
