use std::collections::{BTreeMap, BTreeSet};

use dpl_core::{
    plan_steps, resolve_args, AccountResolver, Address, ArtifactRecord, Compiler, DeployError,
    DeployReason, DeployStep, Network, RunId, RunState, StepOrdering, StepState, TransactionLayer,
};
use dpl_spec::step_file_hash;
use dpl_storage::{fingerprint_mismatch, ArtifactStore, RunJournal};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::util::now_unix;

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Steps to redeploy even when their fingerprint matches.
    pub force: BTreeSet<String>,
    /// Plan and report without submitting transactions or writing records.
    pub dry_run: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct StepReport {
    pub seq: usize,
    pub name: String,
    pub contract: String,
    pub state: StepState,
    pub reason: Option<DeployReason>,
    pub address: Option<Address>,
    pub transaction_hash: Option<String>,
    /// Dry run only: some referenced step would be redeployed, so the zero
    /// address stood in for it.
    pub placeholder_args: bool,
    pub error: Option<String>,
}

impl StepReport {
    fn new(seq: usize, step: &DeployStep) -> Self {
        Self {
            seq,
            name: step.name.clone(),
            contract: step.contract_name().to_string(),
            state: StepState::Pending,
            reason: None,
            address: None,
            transaction_hash: None,
            placeholder_args: false,
            error: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub network: String,
    pub state: RunState,
    pub dry_run: bool,
    pub steps: Vec<StepReport>,
    /// Artifact name to the record in effect after this run.
    pub records: BTreeMap<String, ArtifactRecord>,
}

impl RunReport {
    fn new(network: &Network, dry_run: bool) -> Self {
        Self {
            run_id: RunId::new(),
            network: network.name.clone(),
            state: RunState::NotStarted,
            dry_run,
            steps: vec![],
            records: BTreeMap::new(),
        }
    }

    /// Deployment transactions this run confirmed.
    pub fn transactions(&self) -> usize {
        self.steps.iter().filter(|s| s.state == StepState::Deployed).count()
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.records.get(name).map(|r| r.address)
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn addresses(&self) -> BTreeMap<String, Address> {
        self.records.iter().map(|(k, r)| (k.clone(), r.address)).collect()
    }
}

/// A run that stopped before completing. Records persisted by earlier steps
/// stay in the store; re-running resumes from `step`.
#[derive(Debug, Error)]
#[error("run halted{}: {error}", .step.as_ref().map(|s| format!(" at step `{s}`")).unwrap_or_default())]
pub struct RunHalted {
    pub step: Option<String>,
    pub error: DeployError,
    pub report: RunReport,
}

struct Halt {
    step: Option<String>,
    error: DeployError,
}

impl Halt {
    fn at(step: &str, error: DeployError) -> Self {
        Self { step: Some(step.to_string()), error }
    }
}

impl From<DeployError> for Halt {
    fn from(error: DeployError) -> Self {
        let step = error.step().map(str::to_string);
        Self { step, error }
    }
}

/// Executes a step list against one network: plan, then per step reuse the
/// stored record or deploy and persist a new one. Sequential; halts on the
/// first error.
pub struct DeploymentEngine<'a> {
    resolver: &'a AccountResolver,
    store: &'a dyn ArtifactStore,
    compiler: &'a dyn Compiler,
    transactions: &'a dyn TransactionLayer,
    journal: Option<&'a dyn RunJournal>,
    ordering: StepOrdering,
}

impl<'a> DeploymentEngine<'a> {
    pub fn new(
        resolver: &'a AccountResolver,
        store: &'a dyn ArtifactStore,
        compiler: &'a dyn Compiler,
        transactions: &'a dyn TransactionLayer,
    ) -> Self {
        Self { resolver, store, compiler, transactions, journal: None, ordering: StepOrdering::default() }
    }

    pub fn with_journal(mut self, journal: &'a dyn RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_ordering(mut self, ordering: StepOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn run(&self, network: &Network, steps: &[DeployStep], opts: &RunOptions) -> Result<RunReport, RunHalted> {
        let mut report = RunReport::new(network, opts.dry_run);
        let journal = if opts.dry_run { None } else { self.journal };

        if let Some(j) = journal {
            let began = step_file_hash(steps).and_then(|h| j.begin_run(&report.run_id, &network.name, &h, now_unix()));
            if let Err(e) = began {
                tracing::warn!(run_id = %report.run_id, "journal begin_run failed: {e:#}");
            }
        }
        report.state = RunState::InProgress;
        tracing::info!(run_id = %report.run_id, network = %network.name, steps = steps.len(), dry_run = opts.dry_run, "deployment run started");

        match self.execute(network, steps, opts, journal, &mut report) {
            Ok(()) => {
                report.state = RunState::Completed;
                if let Some(j) = journal {
                    if let Err(e) = j.finish_run(&report.run_id, RunState::Completed, None, None, now_unix()) {
                        tracing::warn!(run_id = %report.run_id, "journal finish_run failed: {e:#}");
                    }
                }
                tracing::info!(
                    run_id = %report.run_id,
                    network = %network.name,
                    transactions = report.transactions(),
                    "deployment run completed"
                );
                Ok(report)
            }
            Err(Halt { step, error }) => {
                report.state = RunState::Halted;
                if let Some(j) = journal {
                    let cause = error.to_string();
                    if let Err(e) = j.finish_run(&report.run_id, RunState::Halted, step.as_deref(), Some(&cause), now_unix()) {
                        tracing::warn!(run_id = %report.run_id, "journal finish_run failed: {e:#}");
                    }
                }
                tracing::warn!(run_id = %report.run_id, network = %network.name, step = ?step, "deployment run halted: {error}");
                Err(RunHalted { step, error, report })
            }
        }
    }

    fn execute(
        &self,
        network: &Network,
        steps: &[DeployStep],
        opts: &RunOptions,
        journal: Option<&dyn RunJournal>,
        report: &mut RunReport,
    ) -> Result<(), Halt> {
        let plan = plan_steps(steps, self.ordering)?;

        // Every sender must resolve before anything is submitted.
        let mut senders: BTreeMap<&str, Address> = BTreeMap::new();
        for step in &plan {
            if !senders.contains_key(step.role.as_str()) {
                let addr = self.resolver.resolve(network, &step.role).map_err(|e| Halt::at(&step.name, e))?;
                senders.insert(&step.role, addr);
            }
        }

        // Addresses visible to later steps. In a dry run, steps that would
        // deploy contribute a zero-address placeholder.
        let mut produced: BTreeMap<String, ArtifactRecord> = BTreeMap::new();
        let mut placeholders: BTreeSet<&str> = BTreeSet::new();

        for (seq, step) in plan.iter().enumerate() {
            let mut sr = StepReport::new(seq, step);
            let result = self.execute_step(network, step, opts, &senders, &produced, &placeholders, &mut sr);
            let record = match result {
                Ok(record) => record,
                Err(halt) => {
                    sr.state = StepState::Failed;
                    sr.error = Some(halt.error.to_string());
                    if let Some(j) = journal {
                        if let Err(e) = j.record_step(&report.run_id, seq, &step.name, StepState::Failed, None, None) {
                            tracing::warn!(step = %step.name, "journal record_step failed: {e:#}");
                        }
                    }
                    report.steps.push(sr);
                    return Err(halt);
                }
            };

            if let Some(j) = journal {
                if let Some(r) = &record {
                    if sr.state == StepState::Deployed {
                        if let Err(e) = j.append_record(&report.run_id, r) {
                            tracing::warn!(step = %step.name, "journal append_record failed: {e:#}");
                        }
                    }
                }
                if let Err(e) = j.record_step(&report.run_id, seq, &step.name, sr.state, sr.address, sr.transaction_hash.as_deref()) {
                    tracing::warn!(step = %step.name, "journal record_step failed: {e:#}");
                }
            }

            match record {
                Some(r) => {
                    produced.insert(step.name.clone(), r.clone());
                    report.records.insert(step.name.clone(), r);
                }
                None => {
                    placeholders.insert(&step.name);
                    produced.insert(step.name.clone(), placeholder(network, step));
                }
            }
            report.steps.push(sr);
        }
        Ok(())
    }

    /// Returns the record in effect after the step, or `None` for a step a dry
    /// run would deploy.
    fn execute_step(
        &self,
        network: &Network,
        step: &DeployStep,
        opts: &RunOptions,
        senders: &BTreeMap<&str, Address>,
        produced: &BTreeMap<String, ArtifactRecord>,
        placeholders: &BTreeSet<&str>,
        sr: &mut StepReport,
    ) -> Result<Option<ArtifactRecord>, Halt> {
        let args = resolve_args(step, produced)?;
        sr.placeholder_args = step.references().iter().any(|r| placeholders.contains(r));

        let contract = step.contract_name();
        let compiled = self
            .compiler
            .compile(contract)
            .map_err(|e| Halt::at(&step.name, DeployError::Compile { contract: contract.to_string(), cause: format!("{e:#}") }))?;

        let existing =
            self.store.lookup(&network.name, &step.name).map_err(|e| Halt::at(&step.name, DeployError::store(&network.name, &step.name, e)))?;
        if let Some(rec) = &existing {
            if rec.chain_id != network.chain_id {
                let e = anyhow::anyhow!("stored record is for chain {}, network is chain {}", rec.chain_id, network.chain_id);
                return Err(Halt::at(&step.name, DeployError::store(&network.name, &step.name, e)));
            }
        }

        let reason = if opts.force.contains(&step.name) {
            DeployReason::Forced
        } else {
            match existing {
                None => DeployReason::New,
                Some(rec) => match fingerprint_mismatch(&rec, &args, &compiled.bytecode_hash) {
                    Some(reason) => reason,
                    None => {
                        tracing::info!(network = %network.name, step = %step.name, address = %rec.address, "reusing deployment");
                        sr.state = StepState::Reused;
                        sr.address = Some(rec.address);
                        sr.transaction_hash = rec.transaction_hash.clone();
                        return Ok(Some(rec));
                    }
                },
            }
        };
        sr.reason = Some(reason);

        if opts.dry_run {
            tracing::info!(network = %network.name, step = %step.name, reason = reason.as_str(), "would deploy");
            return Ok(None);
        }

        let deployer = senders
            .get(step.role.as_str())
            .copied()
            .ok_or_else(|| Halt::at(&step.name, DeployError::UnknownRole { network: network.name.clone(), role: step.role.clone() }))?;
        tracing::info!(network = %network.name, step = %step.name, contract, %deployer, reason = reason.as_str(), "deploying");

        let deployment = self
            .transactions
            .submit_deployment(network, deployer, &compiled, &args)
            .map_err(|e| Halt::from(DeployError::DeploymentFailed { step: step.name.clone(), cause: format!("{e:#}") }))?;

        let record = ArtifactRecord {
            network: network.name.clone(),
            chain_id: network.chain_id,
            name: step.name.clone(),
            contract: contract.to_string(),
            address: deployment.address,
            abi: compiled.abi,
            args,
            bytecode_hash: compiled.bytecode_hash,
            deployer,
            transaction_hash: Some(deployment.transaction_hash.clone()),
            block_number: Some(deployment.block_number),
            deployed_at: now_unix(),
        };
        self.store
            .put(&network.name, &step.name, &record)
            .map_err(|e| Halt::at(&step.name, DeployError::store(&network.name, &step.name, e)))?;

        tracing::info!(network = %network.name, step = %step.name, address = %record.address, tx = %deployment.transaction_hash, "deployed");
        sr.state = StepState::Deployed;
        sr.address = Some(record.address);
        sr.transaction_hash = Some(deployment.transaction_hash);
        Ok(Some(record))
    }
}

fn placeholder(network: &Network, step: &DeployStep) -> ArtifactRecord {
    ArtifactRecord {
        network: network.name.clone(),
        chain_id: network.chain_id,
        name: step.name.clone(),
        contract: step.contract_name().to_string(),
        address: Address::ZERO,
        abi: json!([]),
        args: vec![],
        bytecode_hash: String::new(),
        deployer: Address::ZERO,
        transaction_hash: None,
        block_number: None,
        deployed_at: 0,
    }
}
