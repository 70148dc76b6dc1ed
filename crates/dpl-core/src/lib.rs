pub mod accounts;
pub mod collaborators;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod model;
pub mod plan;
pub mod types;

pub use accounts::*;
pub use alloy_primitives::Address;
pub use collaborators::*;
pub use error::*;
pub use hashing::*;
pub use ids::*;
pub use model::*;
pub use plan::*;
pub use types::*;
