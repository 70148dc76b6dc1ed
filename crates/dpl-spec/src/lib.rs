pub mod steps;

pub use steps::*;
