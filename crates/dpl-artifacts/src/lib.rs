pub mod export;
pub mod store;

pub use export::*;
pub use store::*;
