use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_primitives::hex;
use serde_json::Value;

use crate::{ArtifactRecord, ConstructorArg, DeployError, DeployStep, StepOrdering};

/// Pure planner: validate a step list and return it in execution order.
///
/// - `Declaration`: the list is executed as written. A reference to a name not
///   declared earlier fails with `UnresolvedReference`.
/// - `Graph`: steps are sorted topologically by their references, keeping
///   declaration order among independent steps. Unknown names fail with
///   `UnresolvedReference`, cycles with `CyclicDependency`.
///
/// Duplicate names fail with `DuplicateStep` in both modes. Nothing here touches
/// the network, so a bad list is rejected before any transaction.
pub fn plan_steps(steps: &[DeployStep], ordering: StepOrdering) -> Result<Vec<DeployStep>, DeployError> {
    let mut names = HashSet::new();
    for s in steps {
        if !names.insert(s.name.as_str()) {
            return Err(DeployError::DuplicateStep(s.name.clone()));
        }
    }

    match ordering {
        StepOrdering::Declaration => {
            let mut seen = HashSet::new();
            for s in steps {
                for r in s.references() {
                    if !seen.contains(r) {
                        return Err(unresolved(s, r));
                    }
                }
                seen.insert(s.name.as_str());
            }
            Ok(steps.to_vec())
        }
        StepOrdering::Graph => {
            for s in steps {
                if let Some(r) = s.references().into_iter().find(|r| !names.contains(r)) {
                    return Err(unresolved(s, r));
                }
            }
            topo_sort(steps)
        }
    }
}

fn unresolved(step: &DeployStep, reference: &str) -> DeployError {
    DeployError::UnresolvedReference { step: step.name.clone(), reference: reference.to_string() }
}

fn topo_sort(steps: &[DeployStep]) -> Result<Vec<DeployStep>, DeployError> {
    let deps: HashMap<&str, Vec<&str>> = steps.iter().map(|s| (s.name.as_str(), s.references())).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(steps.len());

    while out.len() < steps.len() {
        // first unplaced step (in declaration order) whose deps are all placed
        let next = steps
            .iter()
            .find(|s| !placed.contains(s.name.as_str()) && deps[s.name.as_str()].iter().all(|d| placed.contains(d)));

        match next {
            Some(s) => {
                placed.insert(s.name.as_str());
                out.push(s.clone());
            }
            None => return Err(DeployError::CyclicDependency { steps: find_cycle(steps, &deps, &placed) }),
        }
    }
    Ok(out)
}

/// Every unplaced step has at least one unplaced dependency, so following
/// those edges from any unplaced step must revisit a node.
fn find_cycle(steps: &[DeployStep], deps: &HashMap<&str, Vec<&str>>, placed: &HashSet<&str>) -> Vec<String> {
    let Some(start) = steps.iter().map(|s| s.name.as_str()).find(|n| !placed.contains(n)) else {
        return vec![];
    };
    let mut path: Vec<&str> = vec![];
    let mut cur = start;
    loop {
        if let Some(pos) = path.iter().position(|n| *n == cur) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(cur.to_string());
            return cycle;
        }
        path.push(cur);
        match deps[cur].iter().find(|d| !placed.contains(*d)) {
            Some(d) => cur = *d,
            None => return path.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Resolve constructor args against artifacts produced earlier in the run.
/// References become the artifact's address as a hex string.
pub fn resolve_args(step: &DeployStep, produced: &BTreeMap<String, ArtifactRecord>) -> Result<Vec<Value>, DeployError> {
    step.args.iter().map(|a| resolve_arg(step, a, produced)).collect()
}

fn resolve_arg(step: &DeployStep, arg: &ConstructorArg, produced: &BTreeMap<String, ArtifactRecord>) -> Result<Value, DeployError> {
    match arg {
        ConstructorArg::Literal(v) => Ok(v.clone()),
        ConstructorArg::Reference(r) => produced
            .get(&r.name)
            .map(|rec| Value::String(hex::encode_prefixed(rec.address.as_slice())))
            .ok_or_else(|| unresolved(step, &r.name)),
        ConstructorArg::List(items) => {
            let resolved = items.iter().map(|a| resolve_arg(step, a, produced)).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
    }
}
