//! Resource Synthesizer, Executor, Status Poller, and Sweeper (spec
//! §4.2, §4.4-§4.6): the stage-sequential / step-parallel engine that
//! drives a validated `Workflow` to completion against a
//! `ClusterClient`.

mod cron;
mod error;
mod executor;
mod naming;
mod outcome;
mod poller;
mod synth;
mod sweeper;

pub use cron::synthesize_cronjob;
pub use error::{EngineError, Result, StepFailureDetail};
pub use executor::Executor;
pub use naming::{bundle_name, repo_secret_name};
pub use outcome::{PollState, StepOutcome};
pub use synth::{shared_labels, synthesize_step, Bundle, SourceProvisioning};
pub use sweeper::Sweeper;
