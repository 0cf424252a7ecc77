//! Verb-noun grammar (spec §6): `<cmd> := create|update|delete|get`,
//! `<noun> := workflow|cw|secret|workflows|secrets`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kubestage", version, about = "Submit and manage kubestage workflows on Kubernetes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit a new workflow, cron workflow, or secret.
    Create(NounArgs),
    /// Re-submit an existing workflow, cron workflow, or secret (idempotent).
    Update(NounArgs),
    /// Remove a workflow, cron workflow, or secret and sweep its objects.
    Delete(NounArgs),
    /// Inspect a single resource, or list all of one kind.
    Get(NounArgs),
}

#[derive(Args)]
pub struct NounArgs {
    #[command(subcommand)]
    pub noun: Noun,
}

#[derive(Subcommand)]
pub enum Noun {
    /// A single workflow run.
    Workflow(WorkflowArgs),
    /// A cron-scheduled workflow.
    Cw(CronWorkflowArgs),
    /// A single secret.
    Secret(SecretArgs),
    /// Every workflow in the namespace.
    Workflows(ListArgs),
    /// Every secret in the namespace.
    Secrets(ListArgs),
}

#[derive(Args)]
pub struct WorkflowArgs {
    /// Identifier of the workflow. Defaults to the config's own `name`
    /// field (create/update) or is required (delete/get).
    #[arg(long)]
    pub id: Option<String>,

    #[arg(short = 'n', long = "namespace", visible_alias = "ns", default_value = "default")]
    pub namespace: String,

    /// Path to the workflow's YAML config (create/update only).
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Overrides the branch named in the config's `source`.
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Credential for a private source repository.
    #[arg(short, long)]
    pub token: Option<String>,

    /// Validate the config and exit without touching the cluster.
    #[arg(long)]
    pub check: bool,

    /// Print the first matched step's pod logs (`get workflow` only).
    #[arg(long)]
    pub logs: bool,
}

#[derive(Args)]
pub struct CronWorkflowArgs {
    #[arg(long)]
    pub id: Option<String>,

    #[arg(short = 'n', long = "namespace", visible_alias = "ns", default_value = "default")]
    pub namespace: String,

    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[arg(short, long)]
    pub branch: Option<String>,

    #[arg(short, long)]
    pub token: Option<String>,

    #[arg(long)]
    pub check: bool,

    /// Five-field cron expression (create/update only).
    #[arg(long)]
    pub schedule: Option<String>,
}

#[derive(Args)]
pub struct SecretArgs {
    /// Name of the secret (required).
    #[arg(long)]
    pub id: String,

    #[arg(short = 'n', long = "namespace", visible_alias = "ns", default_value = "default")]
    pub namespace: String,

    /// Path to a small YAML describing the secret's `kind` and `data`
    /// (create/update only).
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short = 'n', long = "namespace", visible_alias = "ns", default_value = "default")]
    pub namespace: String,
}
