//! Configuration types for barcode-life simulations.

use serde::{Deserialize, Serialize};

use super::{GeneBand, GeneEncoding, GeneIndex, MutationRates};

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Per-agent grid settings.
    #[serde(default)]
    pub barcode: BarcodeConfig,
    /// Gene pool and mutation settings.
    #[serde(default)]
    pub genetics: GeneticsConfig,
    /// Competitive interaction settings.
    #[serde(default)]
    pub interaction: InteractionConfig,
    /// Vitality bookkeeping. `None` disables vitality-driven death.
    #[serde(default)]
    pub vitality: Option<VitalityConfig>,
    /// Shared world settings.
    #[serde(default)]
    pub world: WorldConfig,
    /// Initial population.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Per-agent grid ("barcode") settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarcodeConfig {
    /// Grid width in cells.
    pub width: usize,
    /// Grid height in cells.
    pub height: usize,
    /// Cells excluded on every side when computing movement metrics.
    pub metric_border: usize,
    /// Movement weight for each direction, in the order +x, +y, -x, -y.
    pub direction_weights: [f32; 4],
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            metric_border: 1,
            direction_weights: [1.0; 4],
        }
    }
}

/// Gene pool and mutation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticsConfig {
    /// Largest neighbourhood band genes may be drawn from.
    pub max_band: GeneBand,
    /// How gene values are interpreted.
    pub encoding: GeneEncoding,
    /// Mutation rates given to freshly generated genomes.
    pub initial_rates: RateConfig,
    /// Floor added to every meta-mutation rate.
    pub base_meta_rate: f64,
    /// Insertion and deletion share one parameter.
    pub single_structural_rate: bool,
    /// Offspring inherit (and mutate) their parents' rates instead of the
    /// initial ones.
    pub rates_evolve: bool,
    /// Cap on genome length. Defaults to the size of the gene pool.
    #[serde(default)]
    pub max_genes: Option<usize>,
}

impl Default for GeneticsConfig {
    fn default() -> Self {
        Self {
            max_band: GeneBand::ThreeByThree,
            encoding: GeneEncoding::Behaviour,
            initial_rates: RateConfig::default(),
            base_meta_rate: 0.001,
            single_structural_rate: false,
            rates_evolve: false,
            max_genes: None,
        }
    }
}

impl GeneticsConfig {
    /// One past the largest gene index genomes may carry.
    #[inline]
    pub fn gene_limit(&self) -> GeneIndex {
        self.max_band.end()
    }

    /// Maximum genome length.
    pub fn max_genes(&self) -> usize {
        let pool = self.gene_limit() as usize;
        self.max_genes.map_or(pool, |cap| cap.min(pool))
    }

    /// Mutation-rate parameters for a fresh genome.
    pub fn initial_mutation_rates(&self) -> MutationRates {
        let r = &self.initial_rates;
        MutationRates::from_probabilities(
            [r.flip, r.insertion, r.deletion, r.trans, r.meta],
            self.single_structural_rate,
            self.base_meta_rate,
        )
    }
}

/// Mutation probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    pub flip: f64,
    pub insertion: f64,
    pub deletion: f64,
    pub trans: f64,
    pub meta: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            flip: 0.01,
            insertion: 0.01,
            deletion: 0.01,
            trans: 0.01,
            meta: 0.001,
        }
    }
}

/// Competitive interaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Update rounds simulated per interaction.
    pub rounds: usize,
    /// A side dies when its live fraction leaves `[margin, 1 - margin]`.
    pub live_margin: f64,
    /// Only genomes of equal length may reproduce.
    pub require_equal_lengths: bool,
    /// Minimum age of both parents.
    pub reproductive_age: u32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            live_margin: 0.01,
            require_equal_lengths: false,
            reproductive_age: 0,
        }
    }
}

/// Vitality bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalityConfig {
    /// Vitality of a newborn agent.
    pub initial: f64,
    /// Cost subtracted every step.
    pub step_cost: f64,
    /// How per-family vitality sums are scaled.
    #[serde(default)]
    pub normalisation: VitalityNormalisation,
}

impl Default for VitalityConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            step_cost: 0.01,
            normalisation: VitalityNormalisation::default(),
        }
    }
}

/// Scaling applied to a rule family's summed vitality deltas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VitalityNormalisation {
    /// Divide by the number of candidate centre positions of the family.
    #[default]
    CandidatePositions,
    /// Divide every family by the same constant.
    Fixed { divisor: f64 },
}

/// Axis-aligned rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn area(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }

    #[inline]
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Whether the two rectangles share at least one cell.
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// Whether `other` lies entirely inside `self`.
    #[inline]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// A region of the world seeded with active tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub rect: Rect,
    /// Fraction of the region's tiles active at start.
    pub active_probability: f32,
}

/// Shared world settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// World width in tiles.
    pub width: usize,
    /// World height in tiles.
    pub height: usize,
    /// Granularity of random placement and Brownian motion.
    pub distance_step: i32,
    /// Tile regions.
    pub regions: Vec<RegionConfig>,
    /// Areas agents may never overlap.
    #[serde(default)]
    pub obstacles: Vec<Rect>,
    /// Maximum age before natural death.
    #[serde(default)]
    pub lifespan: Option<u32>,
    /// Tries made to find a collision-free random position.
    pub placement_attempts: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            distance_step: 1,
            regions: vec![RegionConfig {
                rect: Rect::new(0, 0, 256, 256),
                active_probability: 0.15,
            }],
            obstacles: Vec::new(),
            lifespan: None,
            placement_attempts: 64,
        }
    }
}

/// A batch of agents sharing a genome length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationGroup {
    pub genome_length: usize,
    pub count: usize,
}

/// Initial population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub groups: Vec<PopulationGroup>,
    /// Agents of a group share gene indices and differ only in values.
    pub same_gene_indices: bool,
    /// Draw small-neighbourhood genes before larger ones.
    pub simple_genes_first: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            groups: vec![PopulationGroup {
                genome_length: 4,
                count: 200,
            }],
            same_gene_indices: false,
            simple_genes_first: true,
        }
    }
}

impl SimulationConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let barcode = &self.barcode;
        if barcode.width == 0 || barcode.height == 0 {
            return Err(ConfigError::InvalidBarcodeDimensions);
        }
        if 2 * barcode.metric_border >= barcode.width.min(barcode.height) {
            return Err(ConfigError::InvalidMetricBorder(barcode.metric_border));
        }

        let world = &self.world;
        if world.width < barcode.width || world.height < barcode.height {
            return Err(ConfigError::WorldTooSmall);
        }
        if world.distance_step <= 0 {
            return Err(ConfigError::InvalidDistanceStep(world.distance_step));
        }
        let bounds = Rect::new(0, 0, world.width as i32, world.height as i32);
        for (i, region) in world.regions.iter().enumerate() {
            if !bounds.contains_rect(&region.rect) {
                return Err(ConfigError::RegionOutOfBounds { region: i });
            }
            if !(0.0..=1.0).contains(&region.active_probability) {
                return Err(ConfigError::InvalidProbability(format!(
                    "region {} active probability {}",
                    i, region.active_probability
                )));
            }
        }

        let interaction = &self.interaction;
        if interaction.rounds == 0 {
            return Err(ConfigError::InvalidRounds);
        }
        if !(0.0..0.5).contains(&interaction.live_margin) {
            return Err(ConfigError::InvalidLiveMargin(interaction.live_margin));
        }

        let rates = &self.genetics.initial_rates;
        for (name, value) in [
            ("flip", rates.flip),
            ("insertion", rates.insertion),
            ("deletion", rates.deletion),
            ("trans", rates.trans),
            ("meta", rates.meta),
            ("base meta", self.genetics.base_meta_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability(format!(
                    "{name} mutation rate {value}"
                )));
            }
        }

        if let Some(vitality) = &self.vitality
            && let VitalityNormalisation::Fixed { divisor } = vitality.normalisation
            && divisor <= 0.0
        {
            return Err(ConfigError::InvalidVitalityDivisor(divisor));
        }

        let max_genes = self.genetics.max_genes();
        for group in &self.population.groups {
            if group.genome_length > max_genes {
                return Err(ConfigError::GenomeTooLong {
                    length: group.genome_length,
                    max: max_genes,
                });
            }
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Barcode dimensions must be non-zero")]
    InvalidBarcodeDimensions,
    #[error("Metric border {0} leaves no interior cells")]
    InvalidMetricBorder(usize),
    #[error("World must be at least as large as a barcode")]
    WorldTooSmall,
    #[error("Distance step must be positive, got {0}")]
    InvalidDistanceStep(i32),
    #[error("Region {region} lies outside the world")]
    RegionOutOfBounds { region: usize },
    #[error("Interaction rounds must be non-zero")]
    InvalidRounds,
    #[error("Live margin must lie in [0, 0.5), got {0}")]
    InvalidLiveMargin(f64),
    #[error("Invalid probability: {0}")]
    InvalidProbability(String),
    #[error("Fixed vitality divisor must be positive, got {0}")]
    InvalidVitalityDivisor(f64),
    #[error("Genome length {length} exceeds the maximum of {max}")]
    GenomeTooLong { length: usize, max: usize },
}
