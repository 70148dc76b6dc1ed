use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use alloy_primitives::{hex, keccak256, Address};
use anyhow::{anyhow, bail, Context, Result};
use dpl_core::{CompiledContract, Deployment, Network, TransactionLayer};
use serde_json::Value;

use crate::abi::deploy_data;

#[derive(Default)]
struct Chain {
    /// Next nonce per (network, deployer).
    nonces: BTreeMap<(String, Address), u64>,
    /// Addresses already holding a deployment, per network.
    taken: BTreeSet<(String, Address)>,
    block_number: u64,
    submitted: usize,
    reverting: BTreeSet<String>,
}

/// In-process chain for networks without an rpc url. Creation addresses follow
/// the deployer's nonce the way CREATE does, so a fresh instance reproduces
/// them. Nonces whose address is already taken on the network are skipped.
#[derive(Default)]
pub struct SimulatedTransactionLayer {
    chain: Mutex<Chain>,
}

impl SimulatedTransactionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&self) -> Result<MutexGuard<'_, Chain>> {
        self.chain.lock().map_err(|_| anyhow!("simulated chain lock poisoned"))
    }

    /// Mark addresses that already hold a recorded deployment on `network`.
    /// Later creations on that network never land on them.
    pub fn reserve(&self, network: &str, addresses: impl IntoIterator<Item = Address>) -> Result<()> {
        let mut chain = self.chain()?;
        for address in addresses {
            chain.taken.insert((network.to_string(), address));
        }
        Ok(())
    }

    /// Transactions submitted so far, reverted ones included.
    pub fn transaction_count(&self) -> usize {
        self.chain.lock().map(|c| c.submitted).unwrap_or(0)
    }

    pub fn block_number(&self) -> u64 {
        self.chain.lock().map(|c| c.block_number).unwrap_or(0)
    }

    /// Make deployments of `contract` revert until cleared.
    pub fn revert_contract(&self, contract: &str) {
        if let Ok(mut c) = self.chain.lock() {
            c.reverting.insert(contract.to_string());
        }
    }

    pub fn clear_reverts(&self) {
        if let Ok(mut c) = self.chain.lock() {
            c.reverting.clear();
        }
    }
}

impl Chain {
    /// Consume nonces until one yields an address not taken on `network`.
    fn next_creation(&mut self, network: &str, deployer: Address) -> (u64, Address) {
        loop {
            let next = self.nonces.entry((network.to_string(), deployer)).or_insert(0);
            let nonce = *next;
            *next += 1;
            let address = deployer.create(nonce);
            if !self.taken.contains(&(network.to_string(), address)) {
                return (nonce, address);
            }
        }
    }
}

impl TransactionLayer for SimulatedTransactionLayer {
    fn submit_deployment(
        &self,
        network: &Network,
        deployer: Address,
        contract: &CompiledContract,
        args: &[Value],
    ) -> Result<Deployment> {
        let data = deploy_data(contract, args).with_context(|| format!("encode constructor of {}", contract.name))?;

        let mut chain = self.chain()?;
        chain.submitted += 1;
        chain.block_number += 1;
        let (nonce, address) = chain.next_creation(&network.name, deployer);

        let mut preimage = data;
        preimage.extend_from_slice(deployer.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let transaction_hash = hex::encode_prefixed(keccak256(&preimage).as_slice());

        if chain.reverting.contains(&contract.name) {
            bail!("transaction {transaction_hash} reverted");
        }

        chain.taken.insert((network.name.clone(), address));
        tracing::debug!(network = %network.name, contract = %contract.name, %address, nonce, "simulated deployment");
        Ok(Deployment { address, transaction_hash, block_number: chain.block_number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEV_ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn net(name: &str) -> Network {
        Network {
            name: name.into(),
            chain_id: 31337,
            rpc_url: None,
            accounts: vec![],
            explorer_api_key: None,
            ephemeral: true,
        }
    }

    fn lair() -> CompiledContract {
        CompiledContract { name: "Lair".into(), bytecode: vec![0x60], abi: json!([]), bytecode_hash: "h".into() }
    }

    fn dev() -> Address {
        DEV_ACCOUNT.parse().unwrap()
    }

    #[test]
    fn addresses_follow_nonces() {
        let chain = SimulatedTransactionLayer::new();
        let a = chain.submit_deployment(&net("local"), dev(), &lair(), &[]).unwrap();
        let b = chain.submit_deployment(&net("local"), dev(), &lair(), &[]).unwrap();
        assert_eq!(a.address, "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse::<Address>().unwrap());
        assert_eq!(b.address, dev().create(1));
        assert_eq!((a.block_number, b.block_number), (1, 2));
        assert_eq!(chain.transaction_count(), 2);
        assert_eq!(a.transaction_hash.len(), 66);

        let fresh = SimulatedTransactionLayer::new();
        assert_eq!(fresh.submit_deployment(&net("local"), dev(), &lair(), &[]).unwrap().address, a.address);
    }

    #[test]
    fn reserved_addresses_are_skipped() {
        let chain = SimulatedTransactionLayer::new();
        chain.reserve("sim", [dev().create(0), dev().create(1)]).unwrap();
        let d = chain.submit_deployment(&net("sim"), dev(), &lair(), &[]).unwrap();
        assert_eq!(d.address, dev().create(2));

        // Other networks keep their own nonces.
        let other = chain.submit_deployment(&net("local"), dev(), &lair(), &[]).unwrap();
        assert_eq!(other.address, dev().create(0));
    }

    #[test]
    fn injected_revert_fails_and_counts() {
        let chain = SimulatedTransactionLayer::new();
        chain.revert_contract("Lair");
        let err = chain.submit_deployment(&net("local"), dev(), &lair(), &[]).unwrap_err();
        assert!(err.to_string().contains("reverted"));
        assert_eq!(chain.transaction_count(), 1);

        chain.clear_reverts();
        let d = chain.submit_deployment(&net("local"), dev(), &lair(), &[]).unwrap();
        assert_eq!(d.address, dev().create(1));
    }

    #[test]
    fn bad_args_are_not_submitted() {
        let chain = SimulatedTransactionLayer::new();
        assert!(chain.submit_deployment(&net("local"), dev(), &lair(), &[json!(1)]).is_err());
        assert_eq!(chain.transaction_count(), 0);
    }
}
