use crate::{AccountRef, Address, DeployError, NamedAccounts, Network, DEFAULT_DEPLOYER_ROLE};

/// Maps logical role names to concrete addresses on a network.
///
/// Pure lookup over the named-account table: the same (network, role) always
/// yields the same address. A role missing from the table is unknown, except
/// `deployer`, which falls back to the first credential.
#[derive(Clone, Debug, Default)]
pub struct AccountResolver {
    named: NamedAccounts,
}

impl AccountResolver {
    pub fn new(named: NamedAccounts) -> Self {
        Self { named }
    }

    pub fn named_accounts(&self) -> &NamedAccounts {
        &self.named
    }

    pub fn resolve(&self, network: &Network, role: &str) -> Result<Address, DeployError> {
        if network.accounts.is_empty() {
            return Err(DeployError::NoCredentials { network: network.name.clone() });
        }
        let unknown = || DeployError::UnknownRole { network: network.name.clone(), role: role.to_string() };

        let account = match self.named.get(role) {
            Some(spec) => spec.for_network(network).cloned().ok_or_else(unknown)?,
            None if role == DEFAULT_DEPLOYER_ROLE => AccountRef::Index(0),
            None => return Err(unknown()),
        };

        match account {
            AccountRef::Index(i) => network.accounts.get(i).copied().ok_or_else(unknown),
            AccountRef::Address(a) => Ok(a),
        }
    }

    /// Every role the table knows about (plus the implicit deployer), resolved
    /// against `network`. Failures are reported per role.
    pub fn resolve_all(&self, network: &Network) -> Vec<(String, Result<Address, DeployError>)> {
        let mut roles: Vec<String> = self.named.keys().cloned().collect();
        if !self.named.contains_key(DEFAULT_DEPLOYER_ROLE) {
            roles.insert(0, DEFAULT_DEPLOYER_ROLE.to_string());
        }
        roles
            .into_iter()
            .map(|role| {
                let resolved = self.resolve(network, &role);
                (role, resolved)
            })
            .collect()
    }
}
