//! Competitive interaction between co-located agents.
//!
//! Both barcodes are cloned and played against each other for a fixed number
//! of rounds. Each round a side first loses every cell the opponent holds,
//! then steps with its own genome. Sides whose live fraction leaves the
//! configured margin die; survivors may reproduce.

use rand::seq::SliceRandom;

use crate::compute::{Agent, AgentId, Barcode, PatternMaps};
use crate::schema::{GeneticsConfig, Genome, InteractionConfig};

use super::SimRng;

/// Agent storage the interactor reads from and reports outcomes to.
pub trait Lifecycle {
    /// Agent behind a handle, if it still exists.
    fn agent(&self, id: AgentId) -> Option<&Agent>;

    fn is_alive(&self, id: AgentId) -> bool {
        self.agent(id).is_some_and(|agent| agent.alive)
    }

    /// Mark an agent dead and settle its tile balance.
    fn kill(&mut self, id: AgentId);

    /// Add an offspring at `position`. Returns `None` if the world cannot
    /// supply the birth tile.
    fn spawn(&mut self, genome: Genome, position: (i32, i32), rng: &mut SimRng) -> Option<AgentId>;
}

/// Result of playing two barcodes against each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContestOutcome {
    pub first_survives: bool,
    pub second_survives: bool,
    /// Rounds actually played before the contest ended.
    pub rounds: usize,
    /// Live fractions after the last round played.
    pub live_fractions: (f64, f64),
}

impl ContestOutcome {
    #[inline]
    pub fn both_survive(&self) -> bool {
        self.first_survives && self.second_survives
    }
}

/// Decides interaction outcomes and produces offspring.
#[derive(Debug, Clone)]
pub struct Interactor {
    config: InteractionConfig,
}

impl Interactor {
    pub fn new(config: InteractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    /// Play two agents' barcodes against each other on cloned grids.
    pub fn contest(&self, first: &Agent, second: &Agent, maps: &PatternMaps) -> ContestOutcome {
        let genomes = [&first.genome, &second.genome];
        let mut current: [Barcode; 2] = [first.barcode.clone(), second.barcode.clone()];
        let mut next = current.clone();

        let margin = self.config.live_margin;
        let mut alive = [true, true];
        let mut fractions = [current[0].live_fraction(), current[1].live_fraction()];
        let mut rounds = 0;

        while rounds < self.config.rounds && alive[0] && alive[1] {
            for side in 0..2 {
                let other = 1 - side;
                next[side].copy_from(&current[side]);
                next[side].subtract(&current[other]);
                next[side].update(genomes[side], maps);
            }
            std::mem::swap(&mut current, &mut next);
            rounds += 1;

            for side in 0..2 {
                fractions[side] = current[side].live_fraction();
                if fractions[side] < margin || fractions[side] > 1.0 - margin {
                    alive[side] = false;
                }
            }
        }

        ContestOutcome {
            first_survives: alive[0],
            second_survives: alive[1],
            rounds,
            live_fractions: (fractions[0], fractions[1]),
        }
    }

    /// Interact two agents: kill losers and, if both survive and are
    /// compatible, spawn an offspring at the first agent's position.
    pub fn interact<L: Lifecycle>(
        &self,
        lifecycle: &mut L,
        first: AgentId,
        second: AgentId,
        maps: &PatternMaps,
        genetics: &GeneticsConfig,
        rng: &mut SimRng,
    ) -> Option<AgentId> {
        if first == second || !lifecycle.is_alive(first) || !lifecycle.is_alive(second) {
            return None;
        }

        let (outcome, fertile, position) = {
            let a = lifecycle.agent(first)?;
            let b = lifecycle.agent(second)?;
            let outcome = self.contest(a, b, maps);
            (outcome, self.fertile(a, b), a.position())
        };

        if !outcome.first_survives {
            lifecycle.kill(first);
        }
        if !outcome.second_survives {
            lifecycle.kill(second);
        }
        if !outcome.both_survive() || !fertile {
            return None;
        }

        let child = {
            let a = lifecycle.agent(first)?;
            let b = lifecycle.agent(second)?;
            rng.recombine(&a.genome, &b.genome, genetics)
        };
        let child_len = child.len();
        let id = lifecycle.spawn(child, position, rng);
        match id {
            Some(id) => log::debug!("{first} x {second} -> {id} ({child_len} genes)"),
            None => log::debug!("{first} x {second}: no birth tile"),
        }
        id
    }

    /// Interact every pair in random order. Returns the newborn ids.
    pub fn interact_all<L: Lifecycle>(
        &self,
        lifecycle: &mut L,
        mut pairs: Vec<(AgentId, AgentId)>,
        maps: &PatternMaps,
        genetics: &GeneticsConfig,
        rng: &mut SimRng,
    ) -> Vec<AgentId> {
        pairs.shuffle(rng);
        pairs
            .into_iter()
            .filter_map(|(first, second)| {
                self.interact(lifecycle, first, second, maps, genetics, rng)
            })
            .collect()
    }

    /// Whether two survivors may reproduce.
    fn fertile(&self, first: &Agent, second: &Agent) -> bool {
        if self.config.require_equal_lengths && first.genome.len() != second.genome.len() {
            return false;
        }
        first.age >= self.config.reproductive_age && second.age >= self.config.reproductive_age
    }
}
