//! Genome types: gene bands, rule encodings and self-adaptive mutation rates.
//!
//! A genome is a sparse rule set mapping gene indices to output values. Each
//! gene index identifies one local neighbourhood pattern (see the band table
//! on [`GeneBand`]); the value says what the centre cell becomes when that
//! pattern is observed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer identifying one local rule.
pub type GeneIndex = u32;

/// One past the largest valid gene index.
pub const GENE_INDEX_LIMIT: GeneIndex = GeneBand::FiveByFive.end();

/// Contiguous ranges of gene indices grouped by neighbourhood size.
///
/// | band           | cells | indices              |
/// |----------------|-------|----------------------|
/// | `OneCell`      | 1     | `[0, 2)`             |
/// | `ThreeCell`    | 3     | `[2, 10)`            |
/// | `ThreeByThree` | 9     | `[10, 522)`          |
/// | `FiveByFive`   | 25    | `[522, 522 + 2^25)`  |
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum GeneBand {
    OneCell,
    ThreeCell,
    #[default]
    ThreeByThree,
    FiveByFive,
}

impl GeneBand {
    /// All bands in ascending index order.
    pub const ALL: [GeneBand; 4] = [
        GeneBand::OneCell,
        GeneBand::ThreeCell,
        GeneBand::ThreeByThree,
        GeneBand::FiveByFive,
    ];

    /// Number of cells in the neighbourhood pattern.
    #[inline]
    pub const fn pattern_len(self) -> usize {
        match self {
            GeneBand::OneCell => 1,
            GeneBand::ThreeCell => 3,
            GeneBand::ThreeByThree => 9,
            GeneBand::FiveByFive => 25,
        }
    }

    /// Neighbourhood shape as (columns, rows).
    #[inline]
    pub const fn shape(self) -> (usize, usize) {
        match self {
            GeneBand::OneCell => (1, 1),
            GeneBand::ThreeCell => (3, 1),
            GeneBand::ThreeByThree => (3, 3),
            GeneBand::FiveByFive => (5, 5),
        }
    }

    /// First gene index of the band.
    #[inline]
    pub const fn base(self) -> GeneIndex {
        match self {
            GeneBand::OneCell => 0,
            GeneBand::ThreeCell => 2,
            GeneBand::ThreeByThree => 10,
            GeneBand::FiveByFive => 522,
        }
    }

    /// Number of gene indices in the band.
    #[inline]
    pub const fn size(self) -> GeneIndex {
        1 << self.pattern_len()
    }

    /// One past the last gene index of the band.
    #[inline]
    pub const fn end(self) -> GeneIndex {
        self.base() + self.size()
    }

    /// Band containing `index`, if any.
    pub fn of(index: GeneIndex) -> Option<GeneBand> {
        Self::ALL.into_iter().find(|band| index < band.end())
    }

    /// This band and every smaller one, ascending.
    pub fn up_to(self) -> impl Iterator<Item = GeneBand> {
        Self::ALL.into_iter().filter(move |band| *band <= self)
    }
}

/// How a gene's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeneEncoding {
    /// Value is the output cell state (2 possibilities).
    #[default]
    Behaviour,
    /// Value is `2 * behaviour + sign`: the output cell state plus a vitality
    /// delta of `+1` (sign 0) or `-1` (sign 1). 4 possibilities.
    BehaviourVitality,
}

impl GeneEncoding {
    /// Number of legal gene values.
    #[inline]
    pub const fn possibilities(self) -> u8 {
        match self {
            GeneEncoding::Behaviour => 2,
            GeneEncoding::BehaviourVitality => 4,
        }
    }

    /// Cell state written by a gene with this value.
    #[inline]
    pub const fn output(self, value: u8) -> u8 {
        match self {
            GeneEncoding::Behaviour => value,
            GeneEncoding::BehaviourVitality => value >> 1,
        }
    }

    /// Signed vitality contribution of a gene with this value.
    #[inline]
    pub const fn vitality(self, value: u8) -> i64 {
        match self {
            GeneEncoding::Behaviour => 0,
            GeneEncoding::BehaviourVitality => {
                if value & 1 == 0 {
                    1
                } else {
                    -1
                }
            }
        }
    }
}

/// Self-adaptive mutation-rate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationParameter {
    Flip,
    Insertion,
    Deletion,
    Trans,
    Meta,
}

impl MutationParameter {
    pub const ALL: [MutationParameter; 5] = [
        MutationParameter::Flip,
        MutationParameter::Insertion,
        MutationParameter::Deletion,
        MutationParameter::Trans,
        MutationParameter::Meta,
    ];
}

/// Mutation-rate parameters stored as fixed-point fractions of `u16::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MutationRates {
    flip: u16,
    insertion: u16,
    deletion: u16,
    trans: u16,
    meta: u16,
    /// Deletion reads and writes the insertion parameter.
    single_structural: bool,
    /// Floor added to the meta-mutation rate.
    base_meta_rate: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self::from_probabilities([0.01, 0.01, 0.01, 0.01, 0.001], false, 0.001)
    }
}

impl MutationRates {
    /// Largest representable parameter value.
    pub const PARAM_MAX: u16 = u16::MAX;

    /// Build from probabilities ordered as [`MutationParameter::ALL`].
    pub fn from_probabilities(
        probabilities: [f64; 5],
        single_structural: bool,
        base_meta_rate: f64,
    ) -> Self {
        let [flip, insertion, deletion, trans, meta] = probabilities.map(to_param);
        Self {
            flip,
            insertion,
            deletion,
            trans,
            meta,
            single_structural,
            base_meta_rate,
        }
    }

    /// Whether insertion and deletion share one parameter.
    #[inline]
    pub fn single_structural(&self) -> bool {
        self.single_structural
    }

    #[inline]
    pub fn base_meta_rate(&self) -> f64 {
        self.base_meta_rate
    }

    /// Raw fixed-point value of a parameter.
    pub fn parameter(&self, parameter: MutationParameter) -> u16 {
        match parameter {
            MutationParameter::Flip => self.flip,
            MutationParameter::Insertion => self.insertion,
            MutationParameter::Deletion if self.single_structural => self.insertion,
            MutationParameter::Deletion => self.deletion,
            MutationParameter::Trans => self.trans,
            MutationParameter::Meta => self.meta,
        }
    }

    /// Overwrite a parameter's fixed-point value.
    pub fn set_parameter(&mut self, parameter: MutationParameter, value: u16) {
        let slot = match parameter {
            MutationParameter::Flip => &mut self.flip,
            MutationParameter::Insertion => &mut self.insertion,
            MutationParameter::Deletion if self.single_structural => &mut self.insertion,
            MutationParameter::Deletion => &mut self.deletion,
            MutationParameter::Trans => &mut self.trans,
            MutationParameter::Meta => &mut self.meta,
        };
        *slot = value;
    }

    /// Parameter scaled to a probability. The meta rate carries its base offset.
    pub fn rate(&self, parameter: MutationParameter) -> f64 {
        let fraction = f64::from(self.parameter(parameter)) / f64::from(Self::PARAM_MAX);
        match parameter {
            MutationParameter::Meta => self.base_meta_rate + fraction,
            _ => fraction,
        }
    }
}

fn to_param(probability: f64) -> u16 {
    (probability.clamp(0.0, 1.0) * f64::from(MutationRates::PARAM_MAX)) as u16
}

/// Genome construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenomeError {
    #[error("Gene index {0} is outside every pattern band")]
    InvalidGeneIndex(GeneIndex),
    #[error("Gene value {value} is illegal for a rule family with {possibilities} possibilities")]
    InvalidValue { value: u8, possibilities: u8 },
    #[error("Requested genome length {requested} exceeds the {available} available gene indices")]
    LengthExceedsGenePool { requested: usize, available: usize },
}

/// Sparse rule set plus mutation-rate parameters.
///
/// Iteration is index-ascending, which is what ordinal mutation targeting
/// relies on. Deserialization goes through [`Genome::from_genes`], so the
/// large-pattern flag and value ranges are rebuilt rather than trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GenomeRecord", into = "GenomeRecord")]
pub struct Genome {
    genes: BTreeMap<GeneIndex, u8>,
    rates: MutationRates,
    encoding: GeneEncoding,
    has_large_patterns: bool,
}

impl Genome {
    /// Empty genome.
    pub fn new(encoding: GeneEncoding, rates: MutationRates) -> Self {
        Self {
            genes: BTreeMap::new(),
            rates,
            encoding,
            has_large_patterns: false,
        }
    }

    /// Genome from explicit (index, value) pairs. Later duplicates win.
    pub fn from_genes<I>(
        genes: I,
        encoding: GeneEncoding,
        rates: MutationRates,
    ) -> Result<Self, GenomeError>
    where
        I: IntoIterator<Item = (GeneIndex, u8)>,
    {
        let mut genome = Self::new(encoding, rates);
        for (index, value) in genes {
            genome.insert(index, value)?;
        }
        Ok(genome)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    #[inline]
    pub fn get(&self, index: GeneIndex) -> Option<u8> {
        self.genes.get(&index).copied()
    }

    #[inline]
    pub fn contains(&self, index: GeneIndex) -> bool {
        self.genes.contains_key(&index)
    }

    /// Genes in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (GeneIndex, u8)> + '_ {
        self.genes.iter().map(|(&index, &value)| (index, value))
    }

    /// Gene indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = GeneIndex> + '_ {
        self.genes.keys().copied()
    }

    /// Gene at an ordinal position of the ascending iteration order.
    pub fn nth(&self, ordinal: usize) -> Option<(GeneIndex, u8)> {
        self.iter().nth(ordinal)
    }

    /// Whether any gene lives in the 5x5 band.
    #[inline]
    pub fn has_large_patterns(&self) -> bool {
        self.has_large_patterns
    }

    /// Whether any gene lives in `band`.
    pub fn has_band(&self, band: GeneBand) -> bool {
        match band {
            GeneBand::FiveByFive => self.has_large_patterns,
            _ => self.genes.range(band.base()..band.end()).next().is_some(),
        }
    }

    #[inline]
    pub fn encoding(&self) -> GeneEncoding {
        self.encoding
    }

    #[inline]
    pub fn rates(&self) -> &MutationRates {
        &self.rates
    }

    #[inline]
    pub fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    /// Insert or replace a gene, validating index and value.
    pub fn insert(&mut self, index: GeneIndex, value: u8) -> Result<Option<u8>, GenomeError> {
        if index >= GENE_INDEX_LIMIT {
            return Err(GenomeError::InvalidGeneIndex(index));
        }
        let possibilities = self.encoding.possibilities();
        if value >= possibilities {
            return Err(GenomeError::InvalidValue {
                value,
                possibilities,
            });
        }
        Ok(self.put(index, value))
    }

    /// Insert without validation; callers guarantee index and value are legal.
    pub(crate) fn put(&mut self, index: GeneIndex, value: u8) -> Option<u8> {
        debug_assert!(index < GENE_INDEX_LIMIT);
        debug_assert!(value < self.encoding.possibilities());
        if index >= GeneBand::FiveByFive.base() {
            self.has_large_patterns = true;
        }
        self.genes.insert(index, value)
    }

    /// Remove a gene.
    pub fn remove(&mut self, index: GeneIndex) -> Option<u8> {
        let removed = self.genes.remove(&index);
        if removed.is_some() && index >= GeneBand::FiveByFive.base() {
            self.has_large_patterns = self
                .genes
                .range(GeneBand::FiveByFive.base()..)
                .next()
                .is_some();
        }
        removed
    }

    /// Mutable access to gene values, ascending by index.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut u8> + '_ {
        self.genes.values_mut()
    }

    #[inline]
    pub fn flip_rate(&self) -> f64 {
        self.rates.rate(MutationParameter::Flip)
    }

    #[inline]
    pub fn insertion_rate(&self) -> f64 {
        self.rates.rate(MutationParameter::Insertion)
    }

    #[inline]
    pub fn deletion_rate(&self) -> f64 {
        self.rates.rate(MutationParameter::Deletion)
    }

    #[inline]
    pub fn trans_rate(&self) -> f64 {
        self.rates.rate(MutationParameter::Trans)
    }

    #[inline]
    pub fn meta_rate(&self) -> f64 {
        self.rates.rate(MutationParameter::Meta)
    }
}

/// Serialized form of a [`Genome`].
#[derive(Serialize, Deserialize)]
struct GenomeRecord {
    genes: BTreeMap<GeneIndex, u8>,
    rates: MutationRates,
    encoding: GeneEncoding,
}

impl TryFrom<GenomeRecord> for Genome {
    type Error = GenomeError;

    fn try_from(record: GenomeRecord) -> Result<Self, Self::Error> {
        Genome::from_genes(record.genes, record.encoding, record.rates)
    }
}

impl From<Genome> for GenomeRecord {
    fn from(genome: Genome) -> Self {
        Self {
            genes: genome.genes,
            rates: genome.rates,
            encoding: genome.encoding,
        }
    }
}

/// Renders as `{index:value, ...}` in ascending index order.
impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (index, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}:{value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(GeneBand::of(0), Some(GeneBand::OneCell));
        assert_eq!(GeneBand::of(1), Some(GeneBand::OneCell));
        assert_eq!(GeneBand::of(2), Some(GeneBand::ThreeCell));
        assert_eq!(GeneBand::of(9), Some(GeneBand::ThreeCell));
        assert_eq!(GeneBand::of(10), Some(GeneBand::ThreeByThree));
        assert_eq!(GeneBand::of(521), Some(GeneBand::ThreeByThree));
        assert_eq!(GeneBand::of(522), Some(GeneBand::FiveByFive));
        assert_eq!(GeneBand::of(GENE_INDEX_LIMIT - 1), Some(GeneBand::FiveByFive));
        assert_eq!(GeneBand::of(GENE_INDEX_LIMIT), None);
    }

    #[test]
    fn test_bands_are_contiguous() {
        for pair in GeneBand::ALL.windows(2) {
            assert_eq!(pair[0].end(), pair[1].base());
        }
        let (cols, rows) = GeneBand::ThreeCell.shape();
        assert_eq!(cols * rows, GeneBand::ThreeCell.pattern_len());
    }

    #[test]
    fn test_rate_extremes() {
        let mut rates = MutationRates::default();
        for parameter in MutationParameter::ALL {
            rates.set_parameter(parameter, MutationRates::PARAM_MAX);
        }
        assert_eq!(rates.rate(MutationParameter::Flip), 1.0);
        assert_eq!(rates.rate(MutationParameter::Insertion), 1.0);
        assert_eq!(rates.rate(MutationParameter::Deletion), 1.0);
        assert_eq!(rates.rate(MutationParameter::Trans), 1.0);

        for parameter in MutationParameter::ALL {
            rates.set_parameter(parameter, 0);
        }
        assert_eq!(rates.rate(MutationParameter::Flip), 0.0);
        assert_eq!(rates.rate(MutationParameter::Trans), 0.0);
        assert_eq!(rates.rate(MutationParameter::Meta), rates.base_meta_rate());
    }

    #[test]
    fn test_single_structural_routing() {
        let mut rates = MutationRates::from_probabilities([0.0; 5], true, 0.0);
        rates.set_parameter(MutationParameter::Deletion, 1234);
        assert_eq!(rates.parameter(MutationParameter::Insertion), 1234);
        assert_eq!(rates.parameter(MutationParameter::Deletion), 1234);

        rates.set_parameter(MutationParameter::Insertion, 77);
        assert_eq!(rates.parameter(MutationParameter::Deletion), 77);
        assert_eq!(
            rates.rate(MutationParameter::Deletion),
            rates.rate(MutationParameter::Insertion)
        );
    }

    #[test]
    fn test_genome_validation() {
        let mut genome = Genome::new(GeneEncoding::Behaviour, MutationRates::default());
        assert_eq!(
            genome.insert(GENE_INDEX_LIMIT, 0),
            Err(GenomeError::InvalidGeneIndex(GENE_INDEX_LIMIT))
        );
        assert_eq!(
            genome.insert(3, 2),
            Err(GenomeError::InvalidValue {
                value: 2,
                possibilities: 2
            })
        );
        assert_eq!(genome.insert(3, 1), Ok(None));
        assert_eq!(genome.insert(3, 0), Ok(Some(1)));
        assert_eq!(genome.len(), 1);
    }

    #[test]
    fn test_large_pattern_flag_tracks_contents() {
        let mut genome = Genome::from_genes(
            [(4, 1), (600, 0), (700, 1)],
            GeneEncoding::Behaviour,
            MutationRates::default(),
        )
        .unwrap();
        assert!(genome.has_large_patterns());

        genome.remove(600);
        assert!(genome.has_large_patterns());
        genome.remove(700);
        assert!(!genome.has_large_patterns());
    }

    #[test]
    fn test_vitality_encoding() {
        let encoding = GeneEncoding::BehaviourVitality;
        assert_eq!(encoding.output(0b10), 1);
        assert_eq!(encoding.output(0b01), 0);
        assert_eq!(encoding.vitality(0b10), 1);
        assert_eq!(encoding.vitality(0b11), -1);
        assert_eq!(GeneEncoding::Behaviour.vitality(1), 0);
    }

    #[test]
    fn test_display_and_ordinal_access() {
        let genome = Genome::from_genes(
            [(12, 1), (0, 0), (5, 1)],
            GeneEncoding::Behaviour,
            MutationRates::default(),
        )
        .unwrap();
        assert_eq!(genome.to_string(), "{0:0, 5:1, 12:1}");
        assert_eq!(genome.nth(1), Some((5, 1)));
        assert_eq!(genome.nth(3), None);
    }

    #[test]
    fn test_deserialize_rebuilds_large_pattern_flag() {
        let genome = Genome::from_genes(
            [(3, 1), (600, 0)],
            GeneEncoding::Behaviour,
            MutationRates::default(),
        )
        .unwrap();
        let json = serde_json::to_string(&genome).unwrap();
        assert!(!json.contains("has_large_patterns"));

        let loaded: Genome = serde_json::from_str(&json).unwrap();
        assert!(loaded.has_large_patterns());
        assert_eq!(loaded, genome);
    }

    #[test]
    fn test_deserialize_rejects_illegal_genes() {
        let rates = serde_json::to_string(&MutationRates::default()).unwrap();
        let bad_value =
            format!(r#"{{"genes":{{"4":3}},"rates":{rates},"encoding":"Behaviour"}}"#);
        assert!(serde_json::from_str::<Genome>(&bad_value).is_err());

        let bad_index = format!(
            r#"{{"genes":{{"{GENE_INDEX_LIMIT}":0}},"rates":{rates},"encoding":"Behaviour"}}"#
        );
        assert!(serde_json::from_str::<Genome>(&bad_index).is_err());
    }
}
