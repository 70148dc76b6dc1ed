use std::time::{Duration, Instant};

use alloy_primitives::{hex, Address, TxHash, TxKind};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::{TransactionInput, TransactionReceipt, TransactionRequest};
use anyhow::{anyhow, bail, Context, Result};
use dpl_core::{CompiledContract, Deployment, Network, TransactionLayer};
use serde_json::Value;
use tokio::runtime::Runtime;

use crate::abi::deploy_data;

/// Deploys through a node's JSON-RPC endpoint with `eth_sendTransaction`, so the
/// node must hold the deployer's key (dev nodes, remote signers).
pub struct JsonRpcTransactionLayer {
    runtime: Runtime,
    poll_interval: Duration,
    timeout: Duration,
}

impl JsonRpcTransactionLayer {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build rpc runtime")?;
        Ok(Self { runtime, poll_interval: Duration::from_secs(2), timeout: Duration::from_secs(300) })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// How long to wait for a receipt before reporting the deployment as timed out.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chain_id(&self, url: &str) -> Result<u64> {
        self.runtime.block_on(async {
            let provider = http_provider(url)?;
            provider.get_chain_id().await.with_context(|| format!("eth_chainId on {url}"))
        })
    }

    async fn deploy(&self, network: &Network, url: &str, deployer: Address, data: Vec<u8>) -> Result<Deployment> {
        let provider = http_provider(url)?;

        let remote = provider.get_chain_id().await.with_context(|| format!("eth_chainId on {url}"))?;
        if remote != network.chain_id {
            bail!("{url} reports chain {remote}, network `{}` expects {}", network.name, network.chain_id);
        }

        let tx = TransactionRequest {
            from: Some(deployer),
            to: Some(TxKind::Create),
            input: TransactionInput::both(data.into()),
            ..Default::default()
        };
        let pending = provider.send_transaction(tx).await.context("eth_sendTransaction")?;
        let tx_hash = *pending.tx_hash();
        tracing::info!(network = %network.name, tx = %tx_hash, "submitted deployment");

        let receipt = self.wait_for_receipt(&provider, tx_hash).await?;
        if !receipt.status() {
            bail!("transaction {tx_hash} reverted");
        }
        let address = receipt.contract_address.ok_or_else(|| anyhow!("receipt for {tx_hash} has no contractAddress"))?;
        let block_number = receipt.block_number.ok_or_else(|| anyhow!("receipt for {tx_hash} has no blockNumber"))?;
        Ok(Deployment { address, transaction_hash: hex::encode_prefixed(tx_hash.as_slice()), block_number })
    }

    async fn wait_for_receipt(&self, provider: &RootProvider, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let started = Instant::now();
        loop {
            let receipt = provider
                .get_transaction_receipt(tx_hash)
                .await
                .with_context(|| format!("eth_getTransactionReceipt for {tx_hash}"))?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if started.elapsed() >= self.timeout {
                bail!("timed out after {:?} waiting for receipt of {tx_hash}", self.timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn http_provider(url: &str) -> Result<RootProvider> {
    let url: reqwest::Url = url.parse().with_context(|| format!("invalid rpc url {url}"))?;
    Ok(RootProvider::new_http(url))
}

impl TransactionLayer for JsonRpcTransactionLayer {
    fn submit_deployment(
        &self,
        network: &Network,
        deployer: Address,
        contract: &CompiledContract,
        args: &[Value],
    ) -> Result<Deployment> {
        let url = network.rpc_url.as_deref().ok_or_else(|| anyhow!("network `{}` has no rpc url", network.name))?;
        let data = deploy_data(contract, args).with_context(|| format!("encode constructor of {}", contract.name))?;
        tracing::debug!(network = %network.name, contract = %contract.name, bytes = data.len(), "deploying");
        self.runtime.block_on(self.deploy(network, url, deployer, data))
    }
}
