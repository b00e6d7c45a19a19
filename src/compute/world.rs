//! World - the shared tile map, the population, and the step loop.
//!
//! Each step runs in two phases. First every living agent reads its input
//! from a snapshot of the map (with all barcodes burned in), updates and
//! computes metrics; agents share no mutable state, so this runs in parallel.
//! Then feeding, movement, death and interaction are applied sequentially
//! with the caller's RNG.
//!
//! Agent ids are indices into the population and stay valid only within one
//! step: dead agents are compacted away when the step ends.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::seq::{SliceRandom, index};
use rayon::prelude::*;

use crate::schema::{
    ConfigError, GeneBand, GeneIndex, Genome, GenomeError, MutationParameter, Rect,
    SimulationConfig,
};

use super::{
    Agent, AgentId, Interactor, Lifecycle, Metrics, PatternMaps, SimRng, TileGrid, TileMap,
    UpdateReport,
};

/// Number of genes listed in [`WorldStats::common_genes`].
const COMMON_GENES: usize = 15;

/// World construction errors.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not generate genome: {0}")]
    Genome(#[from] GenomeError),
    #[error("No collision-free position found after {attempts} attempts")]
    NoFreePosition { attempts: usize },
    #[error("Configured gene pool includes 5x5 patterns but the long pattern map was not built")]
    MissingLongMap,
}

/// What one step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub step: u64,
    /// Living agents after the step.
    pub population: usize,
    pub born: usize,
    /// Deaths from starvation, saturation, vitality or age.
    pub died: usize,
    /// Deaths from losing an interaction.
    pub killed: usize,
    pub active_tiles: usize,
}

/// Population summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldStats {
    pub step: u64,
    pub population: usize,
    pub active_tiles: usize,
    /// Tiles held by living agents.
    pub bound_tiles: i64,
    pub mean_age: f64,
    pub mean_genome_length: f64,
    /// Genome length -> number of agents.
    pub genome_lengths: BTreeMap<usize, usize>,
    /// Mean rates ordered as [`MutationParameter::ALL`].
    pub mean_rates: [f64; 5],
    /// Most carried genes, most common first.
    pub common_genes: Vec<(GeneIndex, usize)>,
}

impl fmt::Display for WorldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "step {}: {} agents, {} active tiles, {} bound",
            self.step, self.population, self.active_tiles, self.bound_tiles
        )?;
        writeln!(
            f,
            "  mean age {:.2}, mean genome length {:.2}",
            self.mean_age, self.mean_genome_length
        )?;
        let [flip, insertion, deletion, trans, meta] = self.mean_rates;
        writeln!(
            f,
            "  mean rates: flip {flip:.4}, ins {insertion:.4}, del {deletion:.4}, \
             trans {trans:.4}, meta {meta:.4}"
        )?;
        for (length, count) in &self.genome_lengths {
            writeln!(f, "  length {length}: {count} agents")?;
        }
        if !self.common_genes.is_empty() {
            let genes: Vec<String> = self
                .common_genes
                .iter()
                .map(|(index, count)| format!("{index}x{count}"))
                .collect();
            writeln!(f, "  common genes: {}", genes.join(" "))?;
        }
        Ok(())
    }
}

/// Reference simulation world.
pub struct World {
    config: SimulationConfig,
    maps: Arc<PatternMaps>,
    interactor: Interactor,
    map: TileMap,
    agents: Vec<Agent>,
    step: u64,
    /// Balance that left the system when agents died without room to
    /// return it (negative when dead agents had dropped more than taken).
    unsettled_tiles: i64,
    /// Agents stored by [`World::capture_population`].
    captured: Vec<Agent>,
    born: usize,
    killed: usize,
}

impl World {
    /// Build the world: seed tile regions and the initial population.
    pub fn new(
        config: SimulationConfig,
        maps: Arc<PatternMaps>,
        rng: &mut SimRng,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        if config.genetics.max_band >= GeneBand::FiveByFive && maps.long().is_none() {
            return Err(WorldError::MissingLongMap);
        }

        let interactor = Interactor::new(config.interaction.clone());
        let map = TileMap::new(config.world.width, config.world.height);
        let mut world = Self {
            config,
            maps,
            interactor,
            map,
            agents: Vec::new(),
            step: 0,
            unsettled_tiles: 0,
            captured: Vec::new(),
            born: 0,
            killed: 0,
        };

        world.seed_regions(rng);
        world.seed_population(rng)?;

        log::info!(
            "World {}x{}: {} agents, {} active tiles",
            world.map.width(),
            world.map.height(),
            world.agents.len(),
            world.map.count_active()
        );
        Ok(world)
    }

    /// Activate the configured fraction of every region's tiles.
    fn seed_regions(&mut self, rng: &mut SimRng) {
        for region in &self.config.world.regions {
            let rect = region.rect;
            let area = rect.area();
            let count = (f64::from(region.active_probability) * area as f64).round() as usize;
            let count = count.min(area);
            let width = rect.width as usize;
            for k in index::sample(rng, area, count) {
                let x = rect.x as usize + k % width;
                let y = rect.y as usize + k / width;
                self.map.set(x, y, true);
            }
        }
    }

    fn seed_population(&mut self, rng: &mut SimRng) -> Result<(), WorldError> {
        let population = self.config.population.clone();
        let genetics = &self.config.genetics;

        let mut genomes = Vec::new();
        for group in &population.groups {
            let prototype =
                rng.random_genome(group.genome_length, population.simple_genes_first, genetics)?;
            for _ in 0..group.count {
                let genome = if population.same_gene_indices {
                    rng.random_with_same_indices(&prototype)
                } else {
                    rng.random_genome(group.genome_length, population.simple_genes_first, genetics)?
                };
                genomes.push(genome);
            }
            log::debug!(
                "Seeded {} agents with {} genes",
                group.count,
                group.genome_length
            );
        }

        let (width, height) = (self.config.barcode.width, self.config.barcode.height);
        let vitality = self.initial_vitality();
        for genome in genomes {
            let (x, y) = self.random_position(rng).ok_or(WorldError::NoFreePosition {
                attempts: self.config.world.placement_attempts,
            })?;
            self.agents
                .push(Agent::new(genome, width, height, x, y, vitality));
        }
        Ok(())
    }

    /// Random step-aligned position whose footprint avoids every obstacle.
    fn random_position(&self, rng: &mut SimRng) -> Option<(i32, i32)> {
        let (max_x, max_y) = self.max_position();
        let step = self.config.world.distance_step;
        (0..self.config.world.placement_attempts).find_map(|_| {
            let x = step * (rng.gen_range(0..=max_x) / step);
            let y = step * (rng.gen_range(0..=max_y) / step);
            (!collides(&self.config.world.obstacles, &self.footprint_at(x, y))).then_some((x, y))
        })
    }

    /// Advance the world one step.
    pub fn step(&mut self, rng: &mut SimRng) -> StepReport {
        self.step += 1;
        self.born = 0;
        self.killed = 0;

        let snapshot = self.snapshot();
        let maps = &*self.maps;
        let border = self.config.barcode.metric_border;
        let weights = self.config.barcode.direction_weights;

        let results: Vec<Option<(UpdateReport, Metrics)>> = self
            .agents
            .par_iter_mut()
            .map(|agent| {
                if !agent.alive {
                    return None;
                }
                agent
                    .barcode
                    .input_from(&snapshot, agent.x as usize, agent.y as usize);
                let report = agent.barcode.update(&agent.genome, maps);
                Some((report, agent.barcode.compute_metrics(border, weights)))
            })
            .collect();

        let mut died = 0;
        for (i, result) in results.into_iter().enumerate() {
            let Some((report, metrics)) = result else {
                continue;
            };
            if !self.advance_agent(i, report, metrics, rng) {
                self.kill_agent(i);
                died += 1;
            }
        }

        let pairs = self.colocated_pairs();
        let interactor = self.interactor.clone();
        let maps = Arc::clone(&self.maps);
        let genetics = self.config.genetics.clone();
        interactor.interact_all(self, pairs, &maps, &genetics, rng);

        self.agents.retain(|agent| agent.alive);

        let report = StepReport {
            step: self.step,
            population: self.agents.len(),
            born: self.born,
            died,
            killed: self.killed,
            active_tiles: self.map.count_active(),
        };
        log::debug!(
            "Step {}: {} agents ({} born, {} died, {} killed)",
            report.step,
            report.population,
            report.born,
            report.died,
            report.killed
        );
        report
    }

    /// Feeding, movement and survival for one agent. Returns whether the
    /// agent lives on.
    fn advance_agent(
        &mut self,
        i: usize,
        report: UpdateReport,
        metrics: Metrics,
        rng: &mut SimRng,
    ) -> bool {
        let (bw, bh) = (self.config.barcode.width, self.config.barcode.height);
        let border = self.config.barcode.metric_border;
        let (max_x, max_y) = self.max_position();
        let world = &self.config.world;
        let agent = &mut self.agents[i];

        let mut healthy = true;
        if let Some(vitality) = &self.config.vitality {
            agent.vitality +=
                report.normalised_vitality(vitality.normalisation) - vitality.step_cost;
            healthy = agent.vitality > 0.0;
        }

        let (x, y) = (agent.x as usize, agent.y as usize);
        let mut fed = true;
        match metrics.cells_active.cmp(&agent.last_cells_active) {
            Ordering::Greater => {
                fed = agent.barcode.extract_tiles(&mut self.map, x, y, 1, rng);
                if fed {
                    agent.balance += 1;
                }
            }
            Ordering::Less => {
                if agent.barcode.drop_tiles(&mut self.map, x, y, 1, true, rng) {
                    agent.balance -= 1;
                }
            }
            Ordering::Equal => {}
        }
        agent.last_cells_active = metrics.cells_active;

        let (dx, dy) = metrics.movement;
        let (nx, ny) = ((agent.x + dx).clamp(0, max_x), (agent.y + dy).clamp(0, max_y));
        if !collides(&world.obstacles, &Rect::new(nx, ny, bw as i32, bh as i32)) {
            agent.x = nx;
            agent.y = ny;
        }

        let interior = (bw - 2 * border) * (bh - 2 * border);
        let expired = world.lifespan.is_some_and(|lifespan| agent.age > lifespan);
        let starved = metrics.cells_active == 0 || !fed;
        let saturated = metrics.cells_active == interior;
        if starved || saturated || !healthy || expired {
            return false;
        }

        let (ax, ay) = (agent.x, agent.y);
        let (x, y) = self.jitter(ax, ay, rng);
        let agent = &mut self.agents[i];
        agent.x = x;
        agent.y = y;
        agent.age += 1;
        true
    }

    /// Brownian displacement by up to one distance step per axis. Stays put
    /// when every attempt collides.
    fn jitter(&self, x: i32, y: i32, rng: &mut SimRng) -> (i32, i32) {
        let (max_x, max_y) = self.max_position();
        let world = &self.config.world;
        let step = world.distance_step;
        (0..world.placement_attempts)
            .find_map(|_| {
                let nx = (x + step * rng.gen_range(-1..=1)).clamp(0, max_x);
                let ny = (y + step * rng.gen_range(-1..=1)).clamp(0, max_y);
                (!collides(&world.obstacles, &self.footprint_at(nx, ny))).then_some((nx, ny))
            })
            .unwrap_or((x, y))
    }

    /// Store copies of the living population for a later
    /// [`release_population`](Self::release_population). Copies hold no
    /// tiles, so releasing them never changes the tile total. Returns the
    /// number captured.
    pub fn capture_population(&mut self) -> usize {
        self.captured = self
            .agents
            .iter()
            .filter(|agent| agent.alive)
            .map(|agent| Agent {
                balance: 0,
                ..agent.clone()
            })
            .collect();
        log::debug!("Captured {} agents", self.captured.len());
        self.captured.len()
    }

    /// Add the captured agents back into the world. The capture is kept, so
    /// it can be released again. Returns the number released.
    pub fn release_population(&mut self) -> usize {
        self.agents.extend(self.captured.iter().cloned());
        log::debug!("Released {} captured agents", self.captured.len());
        self.captured.len()
    }

    /// Add (`delta > 0`) or remove (`delta < 0`) tiles at random positions
    /// inside the regions, clamped to the free or active region tiles.
    /// Returns the change actually applied.
    pub fn cause_tile_crisis(&mut self, delta: i64, rng: &mut SimRng) -> i64 {
        let mut active = Vec::new();
        let mut free = Vec::new();
        for y in 0..self.map.height() {
            for x in 0..self.map.width() {
                let inside = self
                    .config
                    .world
                    .regions
                    .iter()
                    .any(|region| region.rect.contains_point(x as i32, y as i32));
                if inside {
                    if self.map.get(x, y) {
                        active.push((x, y));
                    } else {
                        free.push((x, y));
                    }
                }
            }
        }

        let delta = delta.clamp(-(active.len() as i64), free.len() as i64);
        let (mut candidates, state) = if delta > 0 {
            (free, true)
        } else {
            (active, false)
        };
        candidates.shuffle(rng);
        for &(x, y) in candidates.iter().take(delta.unsigned_abs() as usize) {
            self.map.set(x, y, state);
        }
        log::debug!("Tile crisis: {delta:+} tiles");
        delta
    }

    /// Clear the map and reseed every region with its configured density.
    /// Tiles bound to agents are unaffected.
    pub fn reset_regions(&mut self, rng: &mut SimRng) {
        self.map.clear();
        self.seed_regions(rng);
    }

    /// Mark an agent dead and return its bound tiles to the map under it,
    /// preferring positions of its active cells.
    fn kill_agent(&mut self, i: usize) {
        let Some(agent) = self.agents.get_mut(i) else {
            return;
        };
        if !agent.alive {
            return;
        }
        agent.alive = false;

        let mut owed = agent.balance;
        if owed > 0 {
            let width = agent.barcode.width();
            let cells = agent.barcode.cells();
            let positions = (0..cells.len())
                .filter(|&k| cells[k] != 0)
                .chain((0..cells.len()).filter(|&k| cells[k] == 0));
            for k in positions {
                if owed == 0 {
                    break;
                }
                let x = agent.x as usize + k % width;
                let y = agent.y as usize + k / width;
                if x < self.map.width() && y < self.map.height() && !self.map.get(x, y) {
                    self.map.set(x, y, true);
                    owed -= 1;
                }
            }
        }
        self.unsettled_tiles += owed;
        agent.balance = 0;
    }

    /// Map copy with every living barcode's active cells burned in.
    fn snapshot(&self) -> TileMap {
        let mut snapshot = self.map.clone();
        for agent in self.agents.iter().filter(|agent| agent.alive) {
            let width = agent.barcode.width();
            for (k, &cell) in agent.barcode.cells().iter().enumerate() {
                let x = agent.x as usize + k % width;
                let y = agent.y as usize + k / width;
                if cell != 0 && x < snapshot.width() && y < snapshot.height() {
                    snapshot.set(x, y, true);
                }
            }
        }
        snapshot
    }

    /// Living agents sharing a position, paired off in id order.
    fn colocated_pairs(&self) -> Vec<(AgentId, AgentId)> {
        let mut colocations: BTreeMap<(i32, i32), Vec<AgentId>> = BTreeMap::new();
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.alive {
                colocations.entry(agent.position()).or_default().push(AgentId(i));
            }
        }
        colocations
            .values()
            .flat_map(|ids| ids.chunks_exact(2).map(|pair| (pair[0], pair[1])))
            .collect()
    }

    #[inline]
    fn max_position(&self) -> (i32, i32) {
        (
            (self.config.world.width - self.config.barcode.width) as i32,
            (self.config.world.height - self.config.barcode.height) as i32,
        )
    }

    #[inline]
    fn footprint_at(&self, x: i32, y: i32) -> Rect {
        Rect::new(
            x,
            y,
            self.config.barcode.width as i32,
            self.config.barcode.height as i32,
        )
    }

    fn initial_vitality(&self) -> f64 {
        self.config.vitality.as_ref().map_or(0.0, |v| v.initial)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn maps(&self) -> &PatternMaps {
        &self.maps
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn population(&self) -> usize {
        self.agents.iter().filter(|agent| agent.alive).count()
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Tiles held by living agents.
    pub fn bound_tiles(&self) -> i64 {
        self.agents
            .iter()
            .filter(|agent| agent.alive)
            .map(|agent| agent.balance)
            .sum()
    }

    /// Balance lost with agents that died without room to return it.
    pub fn unsettled_tiles(&self) -> i64 {
        self.unsettled_tiles
    }

    /// Population summary.
    pub fn stats(&self) -> WorldStats {
        let living: Vec<&Agent> = self.agents.iter().filter(|agent| agent.alive).collect();
        let mut stats = WorldStats {
            step: self.step,
            population: living.len(),
            active_tiles: self.map.count_active(),
            bound_tiles: self.bound_tiles(),
            ..WorldStats::default()
        };
        if living.is_empty() {
            return stats;
        }

        let n = living.len() as f64;
        let mut gene_counts: BTreeMap<GeneIndex, usize> = BTreeMap::new();
        for agent in &living {
            stats.mean_age += f64::from(agent.age);
            stats.mean_genome_length += agent.genome.len() as f64;
            *stats.genome_lengths.entry(agent.genome.len()).or_default() += 1;
            for (slot, parameter) in stats.mean_rates.iter_mut().zip(MutationParameter::ALL) {
                *slot += agent.genome.rates().rate(parameter);
            }
            for index in agent.genome.indices() {
                *gene_counts.entry(index).or_default() += 1;
            }
        }
        stats.mean_age /= n;
        stats.mean_genome_length /= n;
        for rate in &mut stats.mean_rates {
            *rate /= n;
        }

        let mut common: Vec<(GeneIndex, usize)> = gene_counts.into_iter().collect();
        common.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        common.truncate(COMMON_GENES);
        stats.common_genes = common;
        stats
    }
}

impl Lifecycle for World {
    fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.0)
    }

    fn kill(&mut self, id: AgentId) {
        if self.is_alive(id) {
            self.killed += 1;
        }
        self.kill_agent(id.0);
    }

    /// The newborn takes one tile from under the parent's footprint as its
    /// balance, then drifts off the parent's position.
    fn spawn(
        &mut self,
        genome: Genome,
        position: (i32, i32),
        rng: &mut SimRng,
    ) -> Option<AgentId> {
        let (width, height) = (self.config.barcode.width, self.config.barcode.height);
        let mut agent = Agent::new(
            genome,
            width,
            height,
            position.0,
            position.1,
            self.initial_vitality(),
        );
        let (x, y) = (position.0 as usize, position.1 as usize);
        if !agent.barcode.extract_tiles(&mut self.map, x, y, 1, rng) {
            return None;
        }
        agent.balance = 1;
        (agent.x, agent.y) = self.jitter(position.0, position.1, rng);
        self.agents.push(agent);
        self.born += 1;
        Some(AgentId(self.agents.len() - 1))
    }
}

/// Whether `rect` overlaps any obstacle.
#[inline]
fn collides(obstacles: &[Rect], rect: &Rect) -> bool {
    obstacles.iter().any(|obstacle| obstacle.intersects(rect))
}
