//! Evolution module - genome generation, recombination and interaction.
//!
//! # Overview
//!
//! - **Genome operations** (`genome`): random genomes, recombination with
//!   self-adaptive mutation rates, driven by an explicit [`SimRng`]
//! - **Interaction** (`interactor`): contests between co-located agents that
//!   decide survival and produce offspring through a [`Lifecycle`]
//!
//! # Example
//!
//! ```rust,no_run
//! use barcode_life::compute::evolution::SimRng;
//! use barcode_life::schema::GeneticsConfig;
//!
//! let genetics = GeneticsConfig::default();
//! let mut rng = SimRng::new(42);
//!
//! let first = rng.random_genome(8, true, &genetics).unwrap();
//! let second = rng.random_genome(8, false, &genetics).unwrap();
//! let child = rng.recombine(&first, &second, &genetics);
//! println!("offspring: {child}");
//! ```

mod genome;
mod interactor;

pub use genome::SimRng;
pub use interactor::{ContestOutcome, Interactor, Lifecycle};
