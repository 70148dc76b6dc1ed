use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::anyhow;
use dpl_core::{
    AccountResolver, Address, CompiledContract, Compiler, ConstructorArg, DeployError, DeployReason, DeployStep,
    Network, RoleSpec, RunState, StepOrdering, StepState,
};
use dpl_rpc::SimulatedTransactionLayer;
use dpl_runner::{DeploymentEngine, RunHalted, RunOptions};
use dpl_storage::{ArtifactStore, InMemoryArtifactStore, InMemoryJournal, JournalEvent};
use serde_json::json;

const ZERO: &str = "0x0000000000000000000000000000000000000000";

/// Compiler backed by a table, so tests can change a contract's bytecode hash.
struct TableCompiler {
    contracts: Mutex<BTreeMap<String, CompiledContract>>,
}

impl TableCompiler {
    fn new() -> Self {
        let mut contracts = BTreeMap::new();
        let mut add = |name: &str, abi: serde_json::Value| {
            contracts.insert(
                name.to_string(),
                CompiledContract { name: name.to_string(), bytecode: vec![0x60, 0x80], abi, bytecode_hash: format!("{name}-v1") },
            );
        };
        add("Lair", json!([]));
        add(
            "Egg",
            json!([{"type": "constructor", "inputs": [
                {"type": "address"}, {"type": "address[2]"}, {"type": "string"}
            ]}]),
        );
        add("Hatchery", json!([{"type": "constructor", "inputs": [{"type": "address"}, {"type": "uint256"}]}]));
        add("Nest", json!([{"type": "constructor", "inputs": [{"type": "address"}]}]));
        Self { contracts: Mutex::new(contracts) }
    }

    fn rebuild(&self, name: &str, hash: &str) {
        self.contracts.lock().unwrap().get_mut(name).unwrap().bytecode_hash = hash.to_string();
    }
}

impl Compiler for TableCompiler {
    fn compile(&self, contract: &str) -> anyhow::Result<CompiledContract> {
        self.contracts.lock().unwrap().get(contract).cloned().ok_or_else(|| anyhow!("no artifact for {contract}"))
    }
}

fn local(accounts: usize) -> Network {
    Network {
        name: "local".into(),
        chain_id: 31337,
        rpc_url: None,
        accounts: (0..accounts)
            .map(|i| {
                let mut a = [0u8; 20];
                a[0] = 0xf3;
                a[19] = i as u8;
                Address::from(a)
            })
            .collect(),
        explorer_api_key: None,
        ephemeral: true,
    }
}

fn lair() -> DeployStep {
    DeployStep::new("Lair")
}

fn egg() -> DeployStep {
    DeployStep::new("Egg").with_args(vec![
        ConstructorArg::literal(ZERO),
        ConstructorArg::list([ConstructorArg::literal(ZERO), ConstructorArg::literal(ZERO)]),
        ConstructorArg::literal("test"),
    ])
}

fn hatchery(capacity: u64) -> DeployStep {
    DeployStep::new("Hatchery").with_args(vec![ConstructorArg::reference("Lair"), ConstructorArg::literal(capacity)])
}

struct Harness {
    resolver: AccountResolver,
    store: InMemoryArtifactStore,
    compiler: TableCompiler,
    chain: SimulatedTransactionLayer,
    journal: InMemoryJournal,
}

impl Harness {
    fn new() -> Self {
        Self {
            resolver: AccountResolver::default(),
            store: InMemoryArtifactStore::new(),
            compiler: TableCompiler::new(),
            chain: SimulatedTransactionLayer::new(),
            journal: InMemoryJournal::new(),
        }
    }

    fn engine(&self) -> DeploymentEngine<'_> {
        DeploymentEngine::new(&self.resolver, &self.store, &self.compiler, &self.chain).with_journal(&self.journal)
    }

    fn run(&self, steps: &[DeployStep]) -> Result<dpl_runner::RunReport, RunHalted> {
        self.engine().run(&local(1), steps, &RunOptions::default())
    }
}

#[test]
fn lair_egg_deploys_once_then_reuses() {
    let h = Harness::new();
    let steps = vec![lair(), egg()];

    let first = h.run(&steps).unwrap();
    assert_eq!(first.state, RunState::Completed);
    assert_eq!(first.transactions(), 2);
    let lair_addr = first.address("Lair").unwrap();
    let egg_addr = first.address("Egg").unwrap();
    assert!(!lair_addr.is_zero() && !egg_addr.is_zero());
    assert_ne!(lair_addr, egg_addr);
    assert_eq!(h.chain.transaction_count(), 2);

    let second = h.run(&steps).unwrap();
    assert_eq!(second.transactions(), 0);
    assert_eq!(h.chain.transaction_count(), 2);
    assert_eq!(second.addresses(), first.addresses());
    assert_eq!(second.records, first.records);
    assert!(second.steps.iter().all(|s| s.state == StepState::Reused));
}

#[test]
fn records_carry_fingerprint_and_deployer() {
    let h = Harness::new();
    let report = h.run(&[lair(), egg()]).unwrap();
    let rec = h.store.lookup("local", "Egg").unwrap().unwrap();
    assert_eq!(rec, report.records["Egg"]);
    assert_eq!(rec.args, vec![json!(ZERO), json!([ZERO, ZERO]), json!("test")]);
    assert_eq!(rec.bytecode_hash, "Egg-v1");
    assert_eq!(rec.deployer, local(1).accounts[0]);
    assert_eq!(rec.chain_id, 31337);
    assert!(rec.transaction_hash.is_some());
}

#[test]
fn bytecode_change_redeploys_step_and_its_dependents() {
    let h = Harness::new();
    let steps = vec![lair(), egg(), hatchery(3)];
    let first = h.run(&steps).unwrap();

    h.compiler.rebuild("Lair", "Lair-v2");
    let second = h.run(&steps).unwrap();
    assert_eq!(second.step("Lair").unwrap().state, StepState::Deployed);
    assert_eq!(second.step("Lair").unwrap().reason, Some(DeployReason::BytecodeChanged));
    assert_eq!(second.step("Egg").unwrap().state, StepState::Reused);
    assert_eq!(second.step("Hatchery").unwrap().state, StepState::Deployed);
    assert_eq!(second.step("Hatchery").unwrap().reason, Some(DeployReason::ArgsChanged));
    assert_ne!(second.address("Lair"), first.address("Lair"));
    assert_eq!(second.address("Egg"), first.address("Egg"));
    assert_eq!(second.transactions(), 2);
}

#[test]
fn arg_change_redeploys_only_that_step() {
    let h = Harness::new();
    h.run(&[lair(), egg(), hatchery(3)]).unwrap();

    let report = h.run(&[lair(), egg(), hatchery(4)]).unwrap();
    assert_eq!(report.transactions(), 1);
    assert_eq!(report.step("Hatchery").unwrap().reason, Some(DeployReason::ArgsChanged));
    assert_eq!(h.store.lookup("local", "Hatchery").unwrap().unwrap().args[1], json!(4));
}

#[test]
fn forward_reference_fails_before_any_transaction() {
    let h = Harness::new();
    let err = h.run(&[hatchery(3), lair()]).unwrap_err();
    assert!(matches!(err.error, DeployError::UnresolvedReference { ref step, ref reference } if step == "Hatchery" && reference == "Lair"));
    assert_eq!(err.step.as_deref(), Some("Hatchery"));
    assert_eq!(err.report.state, RunState::Halted);
    assert_eq!(h.chain.transaction_count(), 0);
    assert_eq!(h.store.put_count(), 0);
}

#[test]
fn graph_ordering_sorts_and_rejects_cycles() {
    let h = Harness::new();
    let report = h.engine().with_ordering(StepOrdering::Graph).run(&local(1), &[hatchery(3), lair()], &RunOptions::default()).unwrap();
    let order: Vec<_> = report.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(order, vec!["Lair", "Hatchery"]);

    let a = DeployStep::new("A").with_contract("Nest").with_args(vec![ConstructorArg::reference("B")]);
    let b = DeployStep::new("B").with_contract("Nest").with_args(vec![ConstructorArg::reference("A")]);
    let before = h.chain.transaction_count();
    let err = h.engine().with_ordering(StepOrdering::Graph).run(&local(1), &[a, b], &RunOptions::default()).unwrap_err();
    assert!(matches!(err.error, DeployError::CyclicDependency { .. }));
    assert_eq!(h.chain.transaction_count(), before);
}

#[test]
fn duplicate_names_are_rejected() {
    let h = Harness::new();
    let err = h.run(&[lair(), lair()]).unwrap_err();
    assert!(matches!(err.error, DeployError::DuplicateStep(ref n) if n == "Lair"));
}

#[test]
fn failed_step_halts_and_rerun_resumes_there() {
    let h = Harness::new();
    let steps = vec![lair(), egg(), hatchery(3)];

    h.chain.revert_contract("Egg");
    let err = h.run(&steps).unwrap_err();
    assert!(matches!(err.error, DeployError::DeploymentFailed { ref step, .. } if step == "Egg"));
    assert_eq!(err.step.as_deref(), Some("Egg"));
    assert_eq!(err.report.step("Lair").unwrap().state, StepState::Deployed);
    assert_eq!(err.report.step("Egg").unwrap().state, StepState::Failed);
    assert!(err.report.step("Hatchery").is_none());
    assert!(h.store.lookup("local", "Lair").unwrap().is_some());
    assert!(h.store.lookup("local", "Egg").unwrap().is_none());
    let lair_addr = err.report.address("Lair");

    h.chain.clear_reverts();
    let before = h.chain.transaction_count();
    let report = h.run(&steps).unwrap();
    assert_eq!(report.step("Lair").unwrap().state, StepState::Reused);
    assert_eq!(report.address("Lair"), lair_addr);
    assert_eq!(report.step("Egg").unwrap().state, StepState::Deployed);
    assert_eq!(report.step("Hatchery").unwrap().state, StepState::Deployed);
    assert_eq!(h.chain.transaction_count() - before, 2);
}

#[test]
fn unknown_role_halts_before_any_transaction() {
    let h = Harness::new();
    let steps = vec![lair(), egg().from_role("governor")];
    let err = h.run(&steps).unwrap_err();
    assert!(matches!(err.error, DeployError::UnknownRole { ref role, .. } if role == "governor"));
    assert_eq!(err.step.as_deref(), Some("Egg"));
    assert_eq!(h.chain.transaction_count(), 0);
}

#[test]
fn mapped_role_deploys_from_its_account() {
    let mut h = Harness::new();
    let mut named = BTreeMap::new();
    named.insert("governor".to_string(), RoleSpec::index(1));
    h.resolver = AccountResolver::new(named);

    let report = h.engine().run(&local(2), &[lair().from_role("governor")], &RunOptions::default()).unwrap();
    assert_eq!(report.records["Lair"].deployer, local(2).accounts[1]);
}

#[test]
fn network_without_credentials_fails() {
    let h = Harness::new();
    let err = h.engine().run(&local(0), &[lair()], &RunOptions::default()).unwrap_err();
    assert!(matches!(err.error, DeployError::NoCredentials { .. }));
    assert_eq!(h.chain.transaction_count(), 0);
}

#[test]
fn missing_artifact_is_a_compile_error() {
    let h = Harness::new();
    let err = h.run(&[lair(), DeployStep::new("Ghost")]).unwrap_err();
    assert!(matches!(err.error, DeployError::Compile { ref contract, .. } if contract == "Ghost"));
    assert_eq!(err.step.as_deref(), Some("Ghost"));
    assert_eq!(err.report.step("Lair").unwrap().state, StepState::Deployed);
}

#[test]
fn force_redeploys_a_matching_step() {
    let h = Harness::new();
    let steps = vec![lair(), egg()];
    let first = h.run(&steps).unwrap();

    let opts = RunOptions { force: ["Egg".to_string()].into_iter().collect(), dry_run: false };
    let report = h.engine().run(&local(1), &steps, &opts).unwrap();
    assert_eq!(report.step("Lair").unwrap().state, StepState::Reused);
    assert_eq!(report.step("Egg").unwrap().reason, Some(DeployReason::Forced));
    assert_ne!(report.address("Egg"), first.address("Egg"));
}

#[test]
fn dry_run_reports_without_side_effects() {
    let h = Harness::new();
    let steps = vec![lair(), egg(), hatchery(3)];

    let report = h.engine().run(&local(1), &steps, &RunOptions { dry_run: true, ..Default::default() }).unwrap();
    assert!(report.dry_run);
    assert!(report.steps.iter().all(|s| s.state == StepState::Pending && s.reason == Some(DeployReason::New)));
    assert!(report.step("Hatchery").unwrap().placeholder_args);
    assert!(!report.step("Egg").unwrap().placeholder_args);
    assert!(report.records.is_empty());
    assert_eq!(h.chain.transaction_count(), 0);
    assert_eq!(h.store.put_count(), 0);
    assert!(h.journal.events().is_empty());

    h.run(&steps).unwrap();
    h.compiler.rebuild("Egg", "Egg-v2");
    let report = h.engine().run(&local(1), &steps, &RunOptions { dry_run: true, ..Default::default() }).unwrap();
    assert_eq!(report.step("Lair").unwrap().state, StepState::Reused);
    assert_eq!(report.step("Egg").unwrap().state, StepState::Pending);
    assert_eq!(report.step("Hatchery").unwrap().state, StepState::Reused);
}

#[test]
fn journal_sees_every_step_and_record() {
    let h = Harness::new();
    h.run(&[lair(), egg()]).unwrap();
    h.run(&[lair(), egg()]).unwrap();

    let events = h.journal.events();
    let records = events.iter().filter(|e| matches!(e, JournalEvent::Record { .. })).count();
    let steps = events.iter().filter(|e| matches!(e, JournalEvent::Step { .. })).count();
    let finished = events
        .iter()
        .filter(|e| matches!(e, JournalEvent::Finish { state: RunState::Completed, .. }))
        .count();
    assert_eq!(records, 2);
    assert_eq!(steps, 4);
    assert_eq!(finished, 2);
    let expected = dpl_spec::step_file_hash(&[lair(), egg()]).unwrap();
    match &events[0] {
        JournalEvent::Begin { steps_hash, .. } => assert_eq!(steps_hash, &expected),
        other => panic!("expected Begin, got {other:?}"),
    }
}

#[test]
fn stale_record_from_another_chain_is_refused() {
    let h = Harness::new();
    h.run(&[lair()]).unwrap();

    let mut moved = local(1);
    moved.chain_id = 1;
    let err = h.engine().run(&moved, &[lair()], &RunOptions::default()).unwrap_err();
    assert!(matches!(err.error, DeployError::StorePersistence { .. }));
}
