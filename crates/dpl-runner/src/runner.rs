use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dpl_artifacts::{address_book, write_address_book, AddressBook, FsArtifactStore};
use dpl_core::{AccountResolver, Address, ArtifactRecord, DeployError, Network, TransactionLayer};
use dpl_rpc::{JsonRpcTransactionLayer, SimulatedTransactionLayer};
use dpl_spec::StepFile;
use dpl_storage::{ArtifactStore, InMemoryArtifactStore};
use dpl_storage_sqlite::{HistoryEntry, RunSummary, SqliteJournal};
use serde::Serialize;

use crate::{doctor::ensure_healthy, BuildArtifactsCompiler, Config, DeploymentEngine, RunOptions, RunReport};

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub network: String,
    pub chain_id: u64,
    pub records: Vec<ArtifactRecord>,
    pub last_run: Option<RunSummary>,
}

/// Imperative shell around the engine: loads config and step files, picks the
/// store and transaction layer for a network, and keeps the journal.
pub struct Runner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub journal: SqliteJournal,
    pub resolver: AccountResolver,
    compiler: BuildArtifactsCompiler,
    ephemeral: InMemoryArtifactStore,
    simulated: SimulatedTransactionLayer,
}

impl Runner {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo();
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let journal = SqliteJournal::open(&Config::journal_path(&repo_root))?;
        let resolver = AccountResolver::new(cfg.named_accounts.clone());
        let compiler = BuildArtifactsCompiler::new(cfg.artifacts_dir(&repo_root), cfg.compiler.clone());

        Ok(Self {
            repo_root,
            cfg,
            journal,
            resolver,
            compiler,
            ephemeral: InMemoryArtifactStore::new(),
            simulated: SimulatedTransactionLayer::new(),
        })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo();
            cfg.save_to(&cfg_path)?;
            cfg
        };
        let deployments = cfg.deployments_dir(repo_root);
        std::fs::create_dir_all(&deployments).with_context(|| format!("create {}", deployments.display()))?;
        let _ = SqliteJournal::open(&Config::journal_path(repo_root))?;
        Ok(())
    }

    pub fn doctor(&self) -> Result<()> {
        ensure_healthy(&self.repo_root, &self.cfg)
    }

    pub fn network(&self, name: &str) -> Result<Network> {
        self.cfg.network(name)
    }

    pub fn steps(&self) -> Result<StepFile> {
        dpl_spec::load_step_file(&self.cfg.steps_path(&self.repo_root))
    }

    fn deployments(&self) -> FsArtifactStore {
        FsArtifactStore::new(self.cfg.deployments_dir(&self.repo_root))
    }

    /// Ephemeral networks keep records in memory; everything else on disk under
    /// the deployments dir, bound to the network's chain id.
    fn with_store<T>(&self, network: &Network, f: impl FnOnce(&dyn ArtifactStore) -> Result<T>) -> Result<T> {
        if network.ephemeral {
            return f(&self.ephemeral);
        }
        let fs = self.deployments();
        fs.check_chain_id(network)
            .map_err(|e| DeployError::store(&network.name, ".chainId", e))?;
        f(&fs)
    }

    pub fn deploy(&self, network_name: &str, opts: &RunOptions) -> Result<RunReport> {
        let network = self.network(network_name)?;
        let steps = self.steps()?;

        let rpc;
        let transactions: &dyn TransactionLayer = match network.rpc_url {
            Some(_) => {
                rpc = JsonRpcTransactionLayer::new()?;
                &rpc
            }
            None => &self.simulated,
        };

        tracing::info!(network = %network.name, chain_id = network.chain_id, steps = steps.steps.len(), "deploy");
        self.with_store(&network, |store| {
            if network.rpc_url.is_none() {
                self.reserve_recorded(&network, store)?;
            }
            let mut engine = DeploymentEngine::new(&self.resolver, store, &self.compiler, transactions)
                .with_ordering(self.cfg.project.ordering);
            if !network.ephemeral {
                engine = engine.with_journal(&self.journal);
            }
            Ok(engine.run(&network, &steps.steps, opts)?)
        })
    }

    /// The simulated chain starts from nonce 0 in every process. Every address
    /// this network has ever recorded is reserved so new deployments skip them.
    fn reserve_recorded(&self, network: &Network, store: &dyn ArtifactStore) -> Result<()> {
        let mut recorded: Vec<Address> = store.list(&network.name)?.into_iter().map(|r| r.address).collect();
        if !network.ephemeral {
            recorded.extend(self.journal.history(&network.name, None)?.into_iter().map(|e| e.record.address));
        }
        self.simulated.reserve(&network.name, recorded)
    }

    pub fn status(&self, network_name: &str) -> Result<StatusReport> {
        let network = self.network(network_name)?;
        let records = self.with_store(&network, |store| store.list(&network.name))?;
        let last_run = self.journal.last_run(&network.name)?;
        Ok(StatusReport { network: network.name.clone(), chain_id: network.chain_id, records, last_run })
    }

    pub fn accounts(&self, network_name: &str) -> Result<Vec<(String, std::result::Result<Address, DeployError>)>> {
        let network = self.network(network_name)?;
        Ok(self.resolver.resolve_all(&network))
    }

    pub fn export(&self, network_name: &str, out: &Path) -> Result<AddressBook> {
        let network = self.network(network_name)?;
        let book = self.with_store(&network, |store| address_book(store, &network))?;
        write_address_book(out, &book)?;
        tracing::info!(network = %network.name, out = %out.display(), contracts = book.contracts.len(), "exported address book");
        Ok(book)
    }

    pub fn history(&self, network_name: &str, artifact: Option<&str>) -> Result<Vec<HistoryEntry>> {
        self.journal.history(network_name, artifact)
    }

    pub fn runs(&self, network_name: &str) -> Result<Vec<RunSummary>> {
        self.journal.runs(network_name)
    }
}
