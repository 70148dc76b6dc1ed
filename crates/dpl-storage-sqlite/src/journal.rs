use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use dpl_core::{Address, ArtifactRecord, RunId, RunState, StepState};
use dpl_storage::RunJournal;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// One row of `record_history`: a record as it was when written.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub run_id: RunId,
    pub record: ArtifactRecord,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub network: String,
    pub steps_hash: String,
    pub state: RunState,
    pub failed_step: Option<String>,
    pub error: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

/// Append-only run journal. Current records live in the artifact store; this
/// keeps every version that was ever written plus per-run step outcomes.
pub struct SqliteJournal {
    conn: Mutex<Connection>,
}

impl SqliteJournal {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("journal connection lock poisoned"))
    }

    /// Every record written for `network`, oldest first, optionally for one artifact.
    pub fn history(&self, network: &str, name: Option<&str>) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, record_json FROM record_history
             WHERE network = ?1 AND (?2 IS NULL OR name = ?2)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![network, name], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        let mut out = vec![];
        for row in rows {
            let (run_id, json) = row?;
            let record: ArtifactRecord =
                serde_json::from_str(&json).with_context(|| format!("decode history row of run {run_id}"))?;
            out.push(HistoryEntry { run_id: RunId::from_str(run_id), record });
        }
        Ok(out)
    }

    /// Runs against `network`, most recent first.
    pub fn runs(&self, network: &str) -> Result<Vec<RunSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, network, steps_hash, state, failed_step, error, started_at, finished_at
             FROM runs WHERE network = ?1 ORDER BY started_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![network], |r| {
            Ok(RunSummary {
                run_id: RunId::from_str(r.get::<_, String>(0)?),
                network: r.get(1)?,
                steps_hash: r.get(2)?,
                state: RunState::parse(&r.get::<_, String>(3)?).unwrap_or(RunState::InProgress),
                failed_step: r.get(4)?,
                error: r.get(5)?,
                started_at: r.get(6)?,
                finished_at: r.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn step_states(&self, run_id: &RunId) -> Result<Vec<(String, StepState)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT step, state FROM step_events WHERE run_id = ?1 ORDER BY seq, rowid")?;
        let rows = stmt.query_map(params![run_id.as_str()], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        let mut out = vec![];
        for row in rows {
            let (step, state) = row?;
            let state = StepState::parse(&state).ok_or_else(|| anyhow!("unknown step state {state:?}"))?;
            out.push((step, state));
        }
        Ok(out)
    }

    pub fn last_run(&self, network: &str) -> Result<Option<RunSummary>> {
        Ok(self.runs(network)?.into_iter().next())
    }
}

impl RunJournal for SqliteJournal {
    fn begin_run(&self, run_id: &RunId, network: &str, steps_hash: &str, started_at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs(id, network, steps_hash, state, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id.as_str(), network, steps_hash, RunState::InProgress.as_str(), started_at],
        )?;
        Ok(())
    }

    fn record_step(
        &self,
        run_id: &RunId,
        seq: usize,
        step: &str,
        state: StepState,
        address: Option<Address>,
        transaction_hash: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO step_events(run_id, seq, step, state, address, transaction_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id.as_str(),
                seq as i64,
                step,
                state.as_str(),
                address.map(|a| a.to_string()),
                transaction_hash
            ],
        )?;
        Ok(())
    }

    fn append_record(&self, run_id: &RunId, record: &ArtifactRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO record_history(run_id, network, name, address, bytecode_hash, record_json, deployed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id.as_str(),
                record.network,
                record.name,
                record.address.to_string(),
                record.bytecode_hash,
                json,
                record.deployed_at
            ],
        )?;
        Ok(())
    }

    fn finish_run(
        &self,
        run_id: &RunId,
        state: RunState,
        failed_step: Option<&str>,
        error: Option<&str>,
        finished_at: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        let exists: Option<String> = conn
            .query_row("SELECT id FROM runs WHERE id = ?1", params![run_id.as_str()], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(anyhow!("finish_run for unknown run {run_id}"));
        }
        conn.execute(
            "UPDATE runs SET state = ?2, failed_step = ?3, error = ?4, finished_at = ?5 WHERE id = ?1",
            params![run_id.as_str(), state.as_str(), failed_step, error, finished_at],
        )?;
        Ok(())
    }
}
