use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use dpl_core::{Address, NamedAccounts, Network, RoleSpec, StepOrdering, DEFAULT_DEPLOYER_ROLE};

/// First account of the well-known local development mnemonic.
pub const LOCAL_DEV_ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub named_accounts: NamedAccounts,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub steps: String,
    pub deployments_dir: String,
    pub artifacts_dir: String,
    #[serde(default)]
    pub ordering: StepOrdering,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompilerConfig {
    pub version: String,
    pub optimizer: bool,
    pub runs: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self { version: "0.8.6".to_string(), optimizer: true, runs: 200 }
    }
}

/// One `[networks.<name>]` table. String fields may reference `${VAR}` and `~`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub chain_id: u64,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_key: Option<String>,
    #[serde(default)]
    pub ephemeral: bool,
}

fn expand(field: &str, raw: &str) -> Result<String> {
    shellexpand::full(raw)
        .map(|s| s.into_owned())
        .map_err(|e| anyhow!("{field}: environment variable `{}` is not set", e.var_name))
}

impl Config {
    pub fn default_for_repo() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "local".to_string(),
            NetworkConfig {
                url: None,
                chain_id: 31337,
                accounts: vec![LOCAL_DEV_ACCOUNT.to_string()],
                explorer_api_key: None,
                ephemeral: true,
            },
        );
        let mut named_accounts = NamedAccounts::new();
        named_accounts.insert(DEFAULT_DEPLOYER_ROLE.to_string(), RoleSpec::index(0));
        Self {
            project: ProjectConfig {
                steps: "deploy.yaml".to_string(),
                deployments_dir: "deployments".to_string(),
                artifacts_dir: "artifacts".to_string(),
                ordering: StepOrdering::Declaration,
            },
            compiler: CompilerConfig::default(),
            networks,
            named_accounts,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse dpl.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Resolve `[networks.<name>]` into a `Network`, expanding environment references.
    pub fn network(&self, name: &str) -> Result<Network> {
        let nc = self.networks.get(name).ok_or_else(|| {
            let known: Vec<_> = self.networks.keys().map(String::as_str).collect();
            anyhow!("unknown network `{name}` (configured: {})", known.join(", "))
        })?;
        let rpc_url = nc.url.as_deref().map(|u| expand(&format!("networks.{name}.url"), u)).transpose()?;
        let explorer_api_key = nc
            .explorer_api_key
            .as_deref()
            .map(|k| expand(&format!("networks.{name}.explorer_api_key"), k))
            .transpose()?;
        let mut accounts = Vec::with_capacity(nc.accounts.len());
        for (i, raw) in nc.accounts.iter().enumerate() {
            let field = format!("networks.{name}.accounts[{i}]");
            let value = expand(&field, raw)?;
            accounts.push(value.parse::<Address>().with_context(|| field.clone())?);
        }
        Ok(Network { name: name.to_string(), chain_id: nc.chain_id, rpc_url, accounts, explorer_api_key, ephemeral: nc.ephemeral })
    }

    pub fn steps_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(shellexpand::tilde(&self.project.steps).as_ref())
    }

    pub fn deployments_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(shellexpand::tilde(&self.project.deployments_dir).as_ref())
    }

    pub fn artifacts_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(shellexpand::tilde(&self.project.artifacts_dir).as_ref())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".dpl").join("dpl.toml")
    }

    pub fn journal_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".dpl").join("journal.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpl_core::AccountRef;

    const FANTOM: &str = r#"
[project]
steps = "deploy.yaml"
deployments_dir = "deployments"
artifacts_dir = "artifacts"
ordering = "graph"

[compiler]
version = "0.8.6"
optimizer = true
runs = 200

[networks.fantom]
url = "https://rpc.ftm.tools/"
chain_id = 250
accounts = ["${DPL_TEST_FANTOM_DEPLOYER}"]
explorer_api_key = "${DPL_TEST_UNSET_KEY}"

[named_accounts.deployer]
default = 0
fantom = "0x00000000000000000000000000000000000000aa"
"#;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());
        Config::default_for_repo().save_to(&path).unwrap();
        let cfg = Config::load_from(&path).unwrap();
        let local = cfg.network("local").unwrap();
        assert_eq!(local.chain_id, 31337);
        assert!(local.ephemeral);
        assert_eq!(local.accounts[0], LOCAL_DEV_ACCOUNT.parse::<Address>().unwrap());
        assert_eq!(cfg.named_accounts["deployer"].default, Some(AccountRef::Index(0)));
    }

    #[test]
    fn parses_network_tables_and_role_overrides() {
        let cfg: Config = toml::from_str(FANTOM).unwrap();
        assert_eq!(cfg.project.ordering, StepOrdering::Graph);
        let deployer = &cfg.named_accounts["deployer"];
        assert_eq!(deployer.default, Some(AccountRef::Index(0)));
        assert!(matches!(deployer.networks.get("fantom"), Some(AccountRef::Address(_))));
    }

    #[test]
    fn unset_variable_is_named() {
        let cfg: Config = toml::from_str(FANTOM).unwrap();
        std::env::set_var("DPL_TEST_FANTOM_DEPLOYER", "0x00000000000000000000000000000000000000bb");
        let err = cfg.network("fantom").unwrap_err();
        assert!(format!("{err:#}").contains("DPL_TEST_UNSET_KEY"), "{err:#}");

        let mut cfg = cfg;
        cfg.networks.get_mut("fantom").unwrap().explorer_api_key = None;
        let net = cfg.network("fantom").unwrap();
        assert_eq!(net.accounts[0][19], 0xbb);
        assert_eq!(net.rpc_url.as_deref(), Some("https://rpc.ftm.tools/"));
    }

    #[test]
    fn unknown_network_lists_configured_ones() {
        let err = Config::default_for_repo().network("mainnet").unwrap_err();
        assert!(err.to_string().contains("local"));
    }
}
