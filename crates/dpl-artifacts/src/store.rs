use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use dpl_core::{ArtifactRecord, Network};
use dpl_storage::ArtifactStore;

const CHAIN_ID_FILE: &str = ".chainId";

/// Durable record store. Layout:
///
/// ```text
/// <root>/<network>/.chainId         decimal chain id
/// <root>/<network>/<Artifact>.json  one ArtifactRecord per artifact
/// ```
#[derive(Clone)]
pub struct FsArtifactStore {
    pub root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    fn record_path(&self, network: &str, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(anyhow!("invalid artifact name for the deployments layout: {name:?}"));
        }
        Ok(self.network_dir(network).join(format!("{name}.json")))
    }

    /// Fails if the network directory already holds records for a different
    /// chain. Records left behind under the same network name are refused, not
    /// reused. Read-only; the binding is written by the first `put`.
    pub fn check_chain_id(&self, network: &Network) -> Result<()> {
        match self.stored_chain_id(&network.name)? {
            Some(stored) if stored != network.chain_id => Err(self.chain_mismatch(&network.name, stored, network.chain_id)),
            _ => Ok(()),
        }
    }

    /// Chain id the network directory is bound to, if any records were written.
    pub fn stored_chain_id(&self, network: &str) -> Result<Option<u64>> {
        let path = self.network_dir(network).join(CHAIN_ID_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let s = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let stored = s.trim().parse().with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(stored))
    }

    fn chain_mismatch(&self, network: &str, stored: u64, chain_id: u64) -> anyhow::Error {
        anyhow!(
            "{} holds records for chain {stored}, but network `{network}` is chain {chain_id}",
            self.network_dir(network).display()
        )
    }

    fn ensure_chain_id(&self, network: &str, chain_id: u64) -> Result<()> {
        match self.stored_chain_id(network)? {
            Some(stored) if stored != chain_id => Err(self.chain_mismatch(network, stored, chain_id)),
            Some(_) => Ok(()),
            None => {
                let dir = self.network_dir(network);
                std::fs::create_dir_all(&dir).with_context(|| format!("create deployments dir {}", dir.display()))?;
                write_durable(&dir.join(CHAIN_ID_FILE), chain_id.to_string().as_bytes())
            }
        }
    }
}

/// Write to a sibling temp file, fsync, then rename over the target.
fn write_durable(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(bytes).with_context(|| format!("write {}", tmp.display()))?;
        f.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    sync_parent(path)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::File::open(parent)
            .and_then(|d| d.sync_all())
            .with_context(|| format!("sync dir {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

impl ArtifactStore for FsArtifactStore {
    fn lookup(&self, network: &str, name: &str) -> Result<Option<ArtifactRecord>> {
        let path = self.record_path(network, name)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let record: ArtifactRecord =
            serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(record))
    }

    fn put(&self, network: &str, name: &str, record: &ArtifactRecord) -> Result<()> {
        let path = self.record_path(network, name)?;
        self.ensure_chain_id(network, record.chain_id)?;
        let bytes = serde_json::to_vec_pretty(record)?;
        write_durable(&path, &bytes)?;
        tracing::debug!(path = %path.display(), "wrote deployment record");
        Ok(())
    }

    fn list(&self, network: &str) -> Result<Vec<ArtifactRecord>> {
        let dir = self.network_dir(network);
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut records = vec![];
        for entry in std::fs::read_dir(&dir).with_context(|| format!("read dir {}", dir.display()))? {
            let path = entry?.path();
            let is_record = path.extension().is_some_and(|e| e == "json")
                && !path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('.'));
            if !is_record {
                continue;
            }
            let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let record: ArtifactRecord =
                serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
            records.push(record);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}
