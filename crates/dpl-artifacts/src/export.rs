use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use dpl_core::{Address, Network};
use dpl_storage::ArtifactStore;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContractEntry {
    pub address: Address,
    pub abi: serde_json::Value,
}

/// Single-file view of a network's current records, for scripts and frontends.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressBook {
    pub name: String,
    pub chain_id: u64,
    pub contracts: BTreeMap<String, ContractEntry>,
}

pub fn address_book(store: &dyn ArtifactStore, network: &Network) -> Result<AddressBook> {
    let records = store.list(&network.name).with_context(|| format!("list records for {}", network.name))?;
    let contracts = records
        .into_iter()
        .map(|r| (r.name, ContractEntry { address: r.address, abi: r.abi }))
        .collect();
    Ok(AddressBook { name: network.name.clone(), chain_id: network.chain_id, contracts })
}

pub fn write_address_book(path: &Path, book: &AddressBook) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let bytes = serde_json::to_vec_pretty(book)?;
    std::fs::write(path, bytes).with_context(|| format!("write address book {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsArtifactStore;
    use dpl_core::ArtifactRecord;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn exports_current_records() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("deployments"));
        let net = Network {
            name: "fantom".into(),
            chain_id: 250,
            rpc_url: Some("https://rpc.ftm.tools/".into()),
            accounts: vec![],
            explorer_api_key: None,
            ephemeral: false,
        };
        store
            .put(
                "fantom",
                "Lair",
                &ArtifactRecord {
                    network: "fantom".into(),
                    chain_id: 250,
                    name: "Lair".into(),
                    contract: "Lair".into(),
                    address: Address::ZERO,
                    abi: json!([]),
                    args: vec![],
                    bytecode_hash: "h".into(),
                    deployer: Address::ZERO,
                    transaction_hash: None,
                    block_number: None,
                    deployed_at: 0,
                },
            )
            .unwrap();

        let book = address_book(&store, &net).unwrap();
        assert_eq!(book.chain_id, 250);
        assert!(book.contracts.contains_key("Lair"));

        let out = dir.path().join("exports").join("fantom.json");
        write_address_book(&out, &book).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(v["chainId"], json!(250));
        assert_eq!(v["contracts"]["Lair"]["address"], json!("0x0000000000000000000000000000000000000000"));
    }
}
