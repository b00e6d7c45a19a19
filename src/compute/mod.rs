//! Compute module - Pattern index, barcode engine, evolution and world.

mod agent;
mod barcode;
mod pattern;
mod tiles;
mod world;

pub mod evolution;

pub use agent::*;
pub use barcode::*;
pub use evolution::{ContestOutcome, Interactor, Lifecycle, SimRng};
pub use pattern::*;
pub use tiles::*;
pub use world::*;
