use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dpl_core::{canonical_hash, DeployStep};
use serde::{Deserialize, Serialize};

/// Ordered list of deployment steps, as declared in `deploy.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StepFile {
    pub steps: Vec<DeployStep>,
}

pub fn load_step_file(path: &Path) -> Result<StepFile> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read step file: {}", path.display()))?;
    parse_step_file(&s).with_context(|| format!("load {}", path.display()))
}

pub fn parse_step_file(yaml: &str) -> Result<StepFile> {
    let file: StepFile = serde_yaml::from_str(yaml).with_context(|| "parse step file yaml")?;
    validate_step_file(&file)?;
    Ok(file)
}

/// Shape checks only. Reference ordering is the planner's job.
pub fn validate_step_file(file: &StepFile) -> Result<()> {
    if file.steps.is_empty() {
        return Err(anyhow!("step file declares no steps"));
    }
    for step in &file.steps {
        validate_name(&step.name).with_context(|| format!("step `{}`", step.name))?;
        if let Some(contract) = &step.contract {
            validate_name(contract).with_context(|| format!("contract of step `{}`", step.name))?;
        }
        if step.role.trim().is_empty() {
            return Err(anyhow!("step `{}` has an empty `from` role", step.name));
        }
    }
    Ok(())
}

/// Names end up as file names under the deployments directory.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("name must not be empty"));
    }
    if name.starts_with('.') {
        return Err(anyhow!("name must not start with '.': {name}"));
    }
    if let Some(c) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '$'))) {
        return Err(anyhow!("name contains invalid character {c:?}: {name}"));
    }
    Ok(())
}

/// Stable hash of a step list, recorded with every run.
pub fn step_file_hash(steps: &[DeployStep]) -> Result<String> {
    let steps = serde_json::to_value(steps).context("serialize steps")?;
    Ok(canonical_hash(&serde_json::json!({ "steps": steps })))
}
