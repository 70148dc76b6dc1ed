use std::path::Path;

use anyhow::{anyhow, Result};
use dpl_artifacts::FsArtifactStore;
use dpl_core::{plan_steps, AccountResolver, Compiler};

use crate::{BuildArtifactsCompiler, Config};

/// Preflight checks for a repo. Every problem found is reported, not just the first.
pub fn doctor(repo_root: &Path, cfg: &Config) -> Vec<String> {
    let mut problems = vec![];

    let steps_path = cfg.steps_path(repo_root);
    let steps = match dpl_spec::load_step_file(&steps_path) {
        Ok(f) => Some(f.steps),
        Err(e) => {
            problems.push(format!("{e:#}"));
            None
        }
    };

    if let Some(steps) = &steps {
        if let Err(e) = plan_steps(steps, cfg.project.ordering) {
            problems.push(format!("{}: {e}", steps_path.display()));
        }
        let compiler = BuildArtifactsCompiler::new(cfg.artifacts_dir(repo_root), cfg.compiler.clone());
        for step in steps {
            if let Err(e) = compiler.compile(step.contract_name()) {
                problems.push(format!("step `{}`: {e:#}", step.name));
            }
        }
    }

    if cfg.networks.is_empty() {
        problems.push("no networks configured".to_string());
    }
    let resolver = AccountResolver::new(cfg.named_accounts.clone());
    let deployments = FsArtifactStore::new(cfg.deployments_dir(repo_root));
    for name in cfg.networks.keys() {
        let network = match cfg.network(name) {
            Ok(n) => n,
            Err(e) => {
                problems.push(format!("{e:#}"));
                continue;
            }
        };
        if let Some(steps) = &steps {
            let mut roles: Vec<&str> = steps.iter().map(|s| s.role.as_str()).collect();
            roles.sort();
            roles.dedup();
            for role in roles {
                if let Err(e) = resolver.resolve(&network, role) {
                    problems.push(e.to_string());
                }
            }
        }
        if !network.ephemeral {
            if let Err(e) = deployments.check_chain_id(&network) {
                problems.push(format!("{e:#}"));
            }
        }
    }

    problems
}

/// `doctor` as a gate: fails with every problem listed.
pub fn ensure_healthy(repo_root: &Path, cfg: &Config) -> Result<()> {
    let problems = doctor(repo_root, cfg);
    if problems.is_empty() {
        return Ok(());
    }
    Err(anyhow!("doctor found {} problem(s):\n  - {}", problems.len(), problems.join("\n  - ")))
}
