//! Barcode Life - evolving sparse cellular-automaton rules.
//!
//! Every agent carries a genome: a sparse map from neighbourhood patterns to
//! output cell states. The genome drives the agent's small binary grid (its
//! "barcode"), which in turn decides how the agent moves and feeds on a
//! shared tile map. Co-located agents play their barcodes against each other;
//! survivors recombine their genomes into offspring.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration and genome types
//! - `compute`: Pattern index, barcode update engine, evolution, world driver
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use barcode_life::{
//!     compute::{PatternMaps, SimRng, World},
//!     schema::SimulationConfig,
//! };
//!
//! let config = SimulationConfig::default();
//! let maps = Arc::new(PatternMaps::initialise(config.genetics.max_band));
//! let mut rng = SimRng::new(42);
//!
//! let mut world = World::new(config, maps, &mut rng).unwrap();
//! for _ in 0..100 {
//!     world.step(&mut rng);
//! }
//!
//! println!("{}", world.stats());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{Barcode, PatternMaps, SimRng, World, WorldStats};
pub use schema::{Genome, SimulationConfig};
