pub mod compiler;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod runner;
pub mod util;

pub use compiler::*;
pub use config::*;
pub use doctor::*;
pub use engine::*;
pub use runner::*;
pub use util::*;
