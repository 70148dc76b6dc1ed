use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DEPLOYER_ROLE: &str = "deployer";

/// A deployment target. Immutable once loaded; one is selected per run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Option<String>,
    /// Signing accounts, in credential order. Index 0 is the default deployer.
    pub accounts: Vec<Address>,
    /// Only consumed by explorer verification, never by the engine.
    pub explorer_api_key: Option<String>,
    /// Records for ephemeral networks are kept in memory only.
    pub ephemeral: bool,
}

/// Reference to an account within a network.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AccountRef {
    Index(usize),
    Address(Address),
}

/// Per-role account mapping. Network entries are keyed by network name or
/// decimal chain id and take precedence over `default`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<AccountRef>,
    #[serde(flatten)]
    pub networks: BTreeMap<String, AccountRef>,
}

impl RoleSpec {
    pub fn index(i: usize) -> Self {
        Self { default: Some(AccountRef::Index(i)), networks: BTreeMap::new() }
    }

    pub fn for_network(&self, network: &Network) -> Option<&AccountRef> {
        self.networks
            .get(&network.name)
            .or_else(|| self.networks.get(&network.chain_id.to_string()))
            .or(self.default.as_ref())
    }
}

pub type NamedAccounts = BTreeMap<String, RoleSpec>;

/// `{ ref: Name }` in a step file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConstructorArg {
    Reference(ArtifactRef),
    List(Vec<ConstructorArg>),
    Literal(Value),
}

impl ConstructorArg {
    pub fn literal(v: impl Into<Value>) -> Self {
        ConstructorArg::Literal(v.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        ConstructorArg::Reference(ArtifactRef { name: name.into() })
    }

    pub fn list(items: impl IntoIterator<Item = ConstructorArg>) -> Self {
        ConstructorArg::List(items.into_iter().collect())
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConstructorArg::Reference(r) => out.push(&r.name),
            ConstructorArg::List(items) => items.iter().for_each(|i| i.collect_references(out)),
            ConstructorArg::Literal(_) => {}
        }
    }
}

fn default_role() -> String {
    DEFAULT_DEPLOYER_ROLE.to_string()
}

/// How to produce or reuse one artifact.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeployStep {
    pub name: String,
    /// Contract to deploy; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(rename = "from", default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

impl DeployStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), contract: None, role: default_role(), args: vec![] }
    }

    pub fn with_args(mut self, args: Vec<ConstructorArg>) -> Self {
        self.args = args;
        self
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn from_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    /// Artifact names referenced by constructor args, in argument order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = vec![];
        for arg in &self.args {
            arg.collect_references(&mut out);
        }
        out
    }
}

/// Persisted outcome of deploying one artifact on one network.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub network: String,
    pub chain_id: u64,
    pub name: String,
    pub contract: String,
    pub address: Address,
    pub abi: Value,
    /// Constructor args as submitted, with references resolved to addresses.
    pub args: Vec<Value>,
    pub bytecode_hash: String,
    pub deployer: Address,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    pub deployed_at: i64,
}
