use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use dpl_core::{Address, ArtifactRecord, RunId, RunState, StepState};

use crate::traits::{ArtifactStore, RunJournal};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// Records for ephemeral networks and tests. Not durable.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    inner: Mutex<BTreeMap<(String, String), ArtifactRecord>>,
    puts: Mutex<usize>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.lock().map(|n| *n).unwrap_or(0)
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn lookup(&self, network: &str, name: &str) -> Result<Option<ArtifactRecord>> {
        let inner = lock(&self.inner)?;
        Ok(inner.get(&(network.to_string(), name.to_string())).cloned())
    }

    fn put(&self, network: &str, name: &str, record: &ArtifactRecord) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        inner.insert((network.to_string(), name.to_string()), record.clone());
        *lock(&self.puts)? += 1;
        Ok(())
    }

    fn list(&self, network: &str) -> Result<Vec<ArtifactRecord>> {
        let inner = lock(&self.inner)?;
        Ok(inner.iter().filter(|((n, _), _)| n == network).map(|(_, r)| r.clone()).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum JournalEvent {
    Begin { run_id: RunId, network: String, steps_hash: String },
    Step { run_id: RunId, seq: usize, step: String, state: StepState, address: Option<Address> },
    Record { run_id: RunId, record: ArtifactRecord },
    Finish { run_id: RunId, state: RunState, failed_step: Option<String> },
}

/// Journal that keeps events in a vector, for tests.
#[derive(Default)]
pub struct InMemoryJournal {
    events: Mutex<Vec<JournalEvent>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JournalEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl RunJournal for InMemoryJournal {
    fn begin_run(&self, run_id: &RunId, network: &str, steps_hash: &str, _started_at: i64) -> Result<()> {
        lock(&self.events)?.push(JournalEvent::Begin {
            run_id: run_id.clone(),
            network: network.to_string(),
            steps_hash: steps_hash.to_string(),
        });
        Ok(())
    }

    fn record_step(
        &self,
        run_id: &RunId,
        seq: usize,
        step: &str,
        state: StepState,
        address: Option<Address>,
        _transaction_hash: Option<&str>,
    ) -> Result<()> {
        lock(&self.events)?.push(JournalEvent::Step {
            run_id: run_id.clone(),
            seq,
            step: step.to_string(),
            state,
            address,
        });
        Ok(())
    }

    fn append_record(&self, run_id: &RunId, record: &ArtifactRecord) -> Result<()> {
        lock(&self.events)?.push(JournalEvent::Record { run_id: run_id.clone(), record: record.clone() });
        Ok(())
    }

    fn finish_run(
        &self,
        run_id: &RunId,
        state: RunState,
        failed_step: Option<&str>,
        _error: Option<&str>,
        _finished_at: i64,
    ) -> Result<()> {
        lock(&self.events)?.push(JournalEvent::Finish {
            run_id: run_id.clone(),
            state,
            failed_step: failed_step.map(str::to_string),
        });
        Ok(())
    }
}
