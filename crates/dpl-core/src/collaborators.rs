use serde_json::Value;

use crate::{Address, Network};

/// Build output for one contract.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledContract {
    pub name: String,
    pub bytecode: Vec<u8>,
    pub abi: Value,
    /// Changes whenever the bytecode or the compiler settings that produced it change.
    pub bytecode_hash: String,
}

/// Compiler/toolchain collaborator. Must be a pure function of the contract's
/// source identity and the active compiler settings.
pub trait Compiler: Send + Sync {
    fn compile(&self, contract: &str) -> anyhow::Result<CompiledContract>;
}

/// Confirmed on-chain inclusion of a deployment transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub transaction_hash: String,
    pub block_number: u64,
}

/// Transaction-layer collaborator. Signs, broadcasts and blocks until the
/// deployment is confirmed or has failed (rejected, reverted, timed out).
pub trait TransactionLayer: Send + Sync {
    fn submit_deployment(
        &self,
        network: &Network,
        deployer: Address,
        contract: &CompiledContract,
        args: &[Value],
    ) -> anyhow::Result<Deployment>;
}
