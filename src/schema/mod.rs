//! Schema module - Configuration and genome types for barcode-life simulations.

mod config;
mod genome;

pub use config::*;
pub use genome::*;
