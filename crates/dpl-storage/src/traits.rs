use dpl_core::{Address, ArtifactRecord, DeployReason, RunId, RunState, StepState};
use serde_json::Value;

/// Current deployment records, one per (network, artifact name).
pub trait ArtifactStore: Send + Sync {
    fn lookup(&self, network: &str, name: &str) -> anyhow::Result<Option<ArtifactRecord>>;

    /// Replace the current record for (network, name). Durable once this returns.
    fn put(&self, network: &str, name: &str, record: &ArtifactRecord) -> anyhow::Result<()>;

    /// All current records for a network, sorted by name.
    fn list(&self, network: &str) -> anyhow::Result<Vec<ArtifactRecord>>;
}

/// Append-only audit trail beside the current-record store.
pub trait RunJournal: Send + Sync {
    fn begin_run(&self, run_id: &RunId, network: &str, steps_hash: &str, started_at: i64) -> anyhow::Result<()>;

    fn record_step(
        &self,
        run_id: &RunId,
        seq: usize,
        step: &str,
        state: StepState,
        address: Option<Address>,
        transaction_hash: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Called for every record written to the artifact store.
    fn append_record(&self, run_id: &RunId, record: &ArtifactRecord) -> anyhow::Result<()>;

    fn finish_run(
        &self,
        run_id: &RunId,
        state: RunState,
        failed_step: Option<&str>,
        error: Option<&str>,
        finished_at: i64,
    ) -> anyhow::Result<()>;
}

/// Why `existing` cannot be reused for the requested fingerprint, if it can't.
pub fn fingerprint_mismatch(
    existing: &ArtifactRecord,
    requested_args: &[Value],
    requested_bytecode_hash: &str,
) -> Option<DeployReason> {
    if existing.bytecode_hash != requested_bytecode_hash {
        return Some(DeployReason::BytecodeChanged);
    }
    if existing.args.as_slice() != requested_args {
        return Some(DeployReason::ArgsChanged);
    }
    None
}

/// True iff the bytecode hash is unchanged and the resolved constructor args
/// equal the stored ones.
pub fn fingerprint_matches(existing: &ArtifactRecord, requested_args: &[Value], requested_bytecode_hash: &str) -> bool {
    fingerprint_mismatch(existing, requested_args, requested_bytecode_hash).is_none()
}
