//! Agents: a genome, its barcode, and world bookkeeping.

use std::fmt;

use crate::schema::{Genome, Rect};

use super::Barcode;

/// Handle to an agent owned by a [`Lifecycle`](super::Lifecycle)
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentId(pub usize);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A living (or recently dead) individual.
#[derive(Debug, Clone)]
pub struct Agent {
    pub genome: Genome,
    pub barcode: Barcode,
    /// Top-left corner of the barcode footprint in world coordinates.
    pub x: i32,
    pub y: i32,
    pub age: u32,
    pub alive: bool,
    /// Vitality accumulator; only consulted when vitality is configured.
    pub vitality: f64,
    /// Active cells reported by the previous metrics pass.
    pub last_cells_active: usize,
    /// Tiles bound to the agent: extracted minus dropped.
    pub balance: i64,
}

impl Agent {
    /// New agent with an all-zero barcode.
    pub fn new(genome: Genome, width: usize, height: usize, x: i32, y: i32, vitality: f64) -> Self {
        Self {
            genome,
            barcode: Barcode::new(width, height),
            x,
            y,
            age: 0,
            alive: true,
            vitality,
            last_cells_active: 0,
            balance: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// World rectangle covered by the barcode.
    #[inline]
    pub fn footprint(&self) -> Rect {
        Rect::new(
            self.x,
            self.y,
            self.barcode.width() as i32,
            self.barcode.height() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GeneEncoding, MutationRates};

    #[test]
    fn test_new_agent() {
        let genome = Genome::new(GeneEncoding::Behaviour, MutationRates::default());
        let agent = Agent::new(genome, 16, 8, 3, 4, 1.0);

        assert!(agent.alive);
        assert_eq!(agent.barcode.count_live_cells(), 0);
        assert_eq!(agent.footprint(), Rect::new(3, 4, 16, 8));
        assert_eq!(AgentId(7).to_string(), "#7");
    }
}
