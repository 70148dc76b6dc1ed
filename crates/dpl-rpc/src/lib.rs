pub mod abi;
pub mod rpc;
pub mod simulated;

pub use abi::*;
pub use rpc::*;
pub use simulated::*;
