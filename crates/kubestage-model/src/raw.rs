//! Structural decode of the workflow YAML (spec §4.1 phase 1, §6).
//!
//! Unknown top-level or step keys are rejected outright (spec §9 Design
//! Notes: "this is a behavioral contract, not a style preference").

use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<RawSource>,
    pub stages: IndexMap<String, Vec<RawStep>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawSource {
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// The flat per-step schema: discriminated into Task/Service during
/// normalization by the presence of the `service` field (spec §9 Design
/// Notes: "tagged variant over {Task, Service}, discriminated by presence
/// of the `service` field during decode").
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStep {
    pub name: String,
    pub path_to_executable: String,
    pub dependency_path: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: BTreeSet<String>,
    pub cpu_request: f64,
    pub memory_request: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_polling")]
    pub polling_interval: u32,
    #[serde(default)]
    pub warm_up: u32,

    // Task-specific
    #[serde(default)]
    pub backoff_limit: Option<u32>,

    // Service-specific
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub revision_history_limit: Option<u32>,
    #[serde(default)]
    pub min_ready_seconds: Option<u32>,
    #[serde(default)]
    pub service: Option<RawServiceConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ingress: bool,
    #[serde(default)]
    pub max_startup_time: Option<u32>,
}

fn default_timeout() -> u32 {
    20
}

fn default_polling() -> u32 {
    1
}

fn default_port() -> u16 {
    5000
}

pub fn parse(yaml: &str) -> Result<RawConfig, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}
