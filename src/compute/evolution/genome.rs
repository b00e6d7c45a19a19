//! Genome manipulation utilities for the evolving population.
//!
//! Provides random generation, recombination, and mutation operations.

use rand::prelude::*;
use rand::seq::index;

use crate::schema::{
    GeneIndex, GeneticsConfig, Genome, GenomeError, MutationParameter, MutationRates,
};

/// Random number generator wrapper for every stochastic operation.
///
/// One instance drives a whole simulation, so a seed reproduces a run.
pub struct SimRng {
    rng: StdRng,
}

impl SimRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate a genome of `length` distinct genes with random values.
    ///
    /// With `prefer_simple_first`, whole bands are taken in order while they
    /// fit and the first band that does not fit is sampled.
    pub fn random_genome(
        &mut self,
        length: usize,
        prefer_simple_first: bool,
        genetics: &GeneticsConfig,
    ) -> Result<Genome, GenomeError> {
        let available = genetics.gene_limit() as usize;
        if length > available {
            return Err(GenomeError::LengthExceedsGenePool {
                requested: length,
                available,
            });
        }

        let indices: Vec<GeneIndex> = if prefer_simple_first {
            let mut chosen = Vec::with_capacity(length);
            for band in genetics.max_band.up_to() {
                let remaining = length - chosen.len();
                if remaining == 0 {
                    break;
                }
                let size = band.size() as usize;
                if size <= remaining {
                    chosen.extend(band.base()..band.end());
                } else {
                    chosen.extend(
                        index::sample(&mut self.rng, size, remaining)
                            .into_iter()
                            .map(|key| band.base() + key as GeneIndex),
                    );
                }
            }
            chosen
        } else {
            index::sample(&mut self.rng, available, length)
                .into_iter()
                .map(|i| i as GeneIndex)
                .collect()
        };

        let mut genome = Genome::new(genetics.encoding, genetics.initial_mutation_rates());
        let possibilities = genetics.encoding.possibilities();
        for index in indices {
            let value = self.rng.gen_range(0..possibilities);
            genome.put(index, value);
        }
        Ok(genome)
    }

    /// Same loci as `prototype`, fresh random values.
    pub fn random_with_same_indices(&mut self, prototype: &Genome) -> Genome {
        let mut genome = Genome::new(prototype.encoding(), *prototype.rates());
        let possibilities = prototype.encoding().possibilities();
        for index in prototype.indices() {
            let value = self.rng.gen_range(0..possibilities);
            genome.put(index, value);
        }
        genome
    }

    /// Produce an offspring genome from two parents.
    ///
    /// Rates are inherited (or reset), genes are pooled and drawn without
    /// duplicate indices, then insertion, trans-mutation, deletion and flip
    /// mutations are applied with the offspring's own rates.
    pub fn recombine(
        &mut self,
        first: &Genome,
        second: &Genome,
        genetics: &GeneticsConfig,
    ) -> Genome {
        let rates = if genetics.rates_evolve {
            let mut rates = self.crossover_rates(first.rates(), second.rates());
            let meta = rates.rate(MutationParameter::Meta);
            self.bit_flip(&mut rates, meta);
            rates
        } else {
            genetics.initial_mutation_rates()
        };

        let mut child = Genome::new(first.encoding(), rates);
        self.crossover_genes(&mut child, first, second);
        self.mutate(&mut child, genetics);
        child
    }

    /// Bitwise uniform crossover of every rate parameter.
    pub fn crossover_rates(
        &mut self,
        first: &MutationRates,
        second: &MutationRates,
    ) -> MutationRates {
        let mut child = *first;
        for parameter in rate_parameters(first) {
            let mask: u16 = self.rng.r#gen();
            let value = (first.parameter(parameter) & mask) | (second.parameter(parameter) & !mask);
            child.set_parameter(parameter, value);
        }
        child
    }

    /// Flip each bit of every rate parameter with probability `p`.
    pub fn bit_flip(&mut self, rates: &mut MutationRates, p: f64) {
        for parameter in rate_parameters(rates) {
            let mut value = rates.parameter(parameter);
            for bit in 0..u16::BITS {
                if self.rng.r#gen::<f64>() < p {
                    value ^= 1 << bit;
                }
            }
            rates.set_parameter(parameter, value);
        }
    }

    /// Fill `child` from the pooled parent genes up to a random target length.
    fn crossover_genes(&mut self, child: &mut Genome, first: &Genome, second: &Genome) {
        let (l1, l2) = (first.len(), second.len());
        let distinct = l1 + second.indices().filter(|&i| !first.contains(i)).count();
        if distinct == 0 {
            return;
        }
        let target = self.rng.gen_range(l1.min(l2)..=l1.max(l2)).min(distinct);

        let mut pool: Vec<(GeneIndex, u8)> = first.iter().chain(second.iter()).collect();
        pool.shuffle(&mut self.rng);

        for (index, value) in pool {
            if child.len() == target {
                break;
            }
            if !child.contains(index) {
                child.put(index, value);
            }
        }
    }

    /// Structural and point mutations, in that order.
    fn mutate(&mut self, genome: &mut Genome, genetics: &GeneticsConfig) {
        let limit = genetics.gene_limit();
        let possibilities = genome.encoding().possibilities();

        if self.rng.r#gen::<f64>() < genome.insertion_rate()
            && genome.len() < genetics.max_genes()
            && let Some(index) = self.absent_index(genome, limit)
        {
            let value = self.rng.gen_range(0..possibilities);
            genome.put(index, value);
        }

        if self.rng.r#gen::<f64>() < genome.trans_rate() && !genome.is_empty() {
            let ordinal = self.rng.gen_range(0..genome.len());
            // Drawn before removal so the new locus differs from the old one.
            if let Some(index) = self.absent_index(genome, limit)
                && let Some((old, _)) = genome.nth(ordinal)
            {
                genome.remove(old);
                let value = self.rng.gen_range(0..possibilities);
                genome.put(index, value);
            }
        }

        if self.rng.r#gen::<f64>() < genome.deletion_rate()
            && genome.len() >= 2
            && let Some((index, _)) = genome.nth(self.rng.gen_range(0..genome.len()))
        {
            genome.remove(index);
        }

        let flip_rate = genome.flip_rate();
        for value in genome.values_mut() {
            if self.rng.r#gen::<f64>() < flip_rate {
                *value = if possibilities == 2 {
                    *value ^ 1
                } else {
                    self.rng.gen_range(0..possibilities)
                };
            }
        }
    }

    /// Uniform random index below `limit` that `genome` does not carry.
    fn absent_index(&mut self, genome: &Genome, limit: GeneIndex) -> Option<GeneIndex> {
        let present = genome.indices().take_while(|&i| i < limit).count();
        let free = limit as usize - present;
        if free == 0 {
            return None;
        }

        let mut index = self.rng.gen_range(0..free) as GeneIndex;
        for p in genome.indices() {
            if p <= index {
                index += 1;
            } else {
                break;
            }
        }
        Some(index)
    }

}

impl RngCore for SimRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Parameters with their own storage. Deletion shares insertion's slot in
/// single-structural mode.
fn rate_parameters(rates: &MutationRates) -> impl Iterator<Item = MutationParameter> + use<> {
    let shared = rates.single_structural();
    MutationParameter::ALL
        .into_iter()
        .filter(move |&p| !(shared && p == MutationParameter::Deletion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GeneBand, GeneEncoding, RateConfig};
    use std::collections::BTreeSet;

    fn genetics(rates: RateConfig) -> GeneticsConfig {
        GeneticsConfig {
            initial_rates: rates,
            ..GeneticsConfig::default()
        }
    }

    fn no_mutation() -> RateConfig {
        RateConfig {
            flip: 0.0,
            insertion: 0.0,
            deletion: 0.0,
            trans: 0.0,
            meta: 0.0,
        }
    }

    fn genome_of(indices: &[GeneIndex], value: u8, genetics: &GeneticsConfig) -> Genome {
        Genome::from_genes(
            indices.iter().map(|&i| (i, value)),
            genetics.encoding,
            genetics.initial_mutation_rates(),
        )
        .unwrap()
    }

    #[test]
    fn test_random_genome_simple_first() {
        let mut rng = SimRng::new(42);
        let config = GeneticsConfig::default();

        let genome = rng.random_genome(10, true, &config).unwrap();
        assert_eq!(genome.indices().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());

        let genome = rng.random_genome(12, true, &config).unwrap();
        assert_eq!(genome.len(), 12);
        assert_eq!(genome.indices().filter(|&i| i < 10).count(), 10);
        assert!(genome.indices().all(|i| i < GeneBand::ThreeByThree.end()));
    }

    #[test]
    fn test_random_genome_uniform() {
        let mut rng = SimRng::new(42);
        let config = GeneticsConfig::default();

        let genome = rng.random_genome(100, false, &config).unwrap();
        assert_eq!(genome.len(), 100);
        assert!(genome.indices().all(|i| i < config.gene_limit()));
        assert!(genome.iter().all(|(_, v)| v < 2));
    }

    #[test]
    fn test_random_genome_too_long() {
        let mut rng = SimRng::new(42);
        let config = GeneticsConfig::default();
        assert_eq!(
            rng.random_genome(523, false, &config).unwrap_err(),
            GenomeError::LengthExceedsGenePool {
                requested: 523,
                available: 522
            }
        );
    }

    #[test]
    fn test_random_vitality_values() {
        let mut rng = SimRng::new(3);
        let config = GeneticsConfig {
            encoding: GeneEncoding::BehaviourVitality,
            ..GeneticsConfig::default()
        };
        let genome = rng.random_genome(200, false, &config).unwrap();
        assert!(genome.iter().all(|(_, v)| v < 4));
        assert!(genome.iter().any(|(_, v)| v >= 2));
    }

    #[test]
    fn test_same_indices() {
        let mut rng = SimRng::new(42);
        let config = GeneticsConfig::default();
        let prototype = rng.random_genome(30, false, &config).unwrap();
        let copy = rng.random_with_same_indices(&prototype);

        assert!(copy.indices().eq(prototype.indices()));
        assert_ne!(copy, prototype);
    }

    #[test]
    fn test_recombine_length_bounds() {
        let mut rng = SimRng::new(7);
        let config = genetics(no_mutation());
        let first = genome_of(&[0, 1, 2, 3], 0, &config);
        let second = genome_of(&[3, 4, 5, 6, 7, 8, 9, 10], 1, &config);

        for _ in 0..200 {
            let child = rng.recombine(&first, &second, &config);
            assert!((4..=8).contains(&child.len()));
            assert!(
                child
                    .iter()
                    .all(|(i, v)| first.get(i) == Some(v) || second.get(i) == Some(v))
            );
        }
    }

    #[test]
    fn test_recombine_caps_at_distinct_pool() {
        let mut rng = SimRng::new(7);
        let config = genetics(no_mutation());
        let first = genome_of(&[5, 6, 7], 0, &config);
        let second = genome_of(&[5, 6, 7], 1, &config);

        for _ in 0..50 {
            let child = rng.recombine(&first, &second, &config);
            assert_eq!(child.indices().collect::<Vec<_>>(), vec![5, 6, 7]);
        }
    }

    #[test]
    fn test_recombine_flip_all() {
        let mut rng = SimRng::new(1);
        let config = genetics(RateConfig {
            flip: 1.0,
            ..no_mutation()
        });
        let parent = genome_of(&[0, 4, 11], 1, &config);
        let child = rng.recombine(&parent, &parent, &config);

        assert!(child.indices().eq(parent.indices()));
        assert!(child.iter().all(|(_, v)| v == 0));
    }

    #[test]
    fn test_recombine_structural_mutations() {
        let mut rng = SimRng::new(9);
        let parent_config = genetics(no_mutation());
        let parent = genome_of(&[0, 1, 2, 3, 4], 0, &parent_config);

        let insert = genetics(RateConfig {
            insertion: 1.0,
            ..no_mutation()
        });
        assert_eq!(rng.recombine(&parent, &parent, &insert).len(), 6);

        let delete = genetics(RateConfig {
            deletion: 1.0,
            ..no_mutation()
        });
        assert_eq!(rng.recombine(&parent, &parent, &delete).len(), 4);

        let trans = genetics(RateConfig {
            trans: 1.0,
            ..no_mutation()
        });
        let child = rng.recombine(&parent, &parent, &trans);
        assert_eq!(child.len(), 5);
        let moved: BTreeSet<_> = child.indices().filter(|i| !parent.contains(*i)).collect();
        assert_eq!(moved.len(), 1);
    }

    #[test]
    fn test_insertion_respects_max_genes() {
        let mut rng = SimRng::new(9);
        let config = GeneticsConfig {
            max_genes: Some(3),
            ..genetics(RateConfig {
                insertion: 1.0,
                ..no_mutation()
            })
        };
        let parent = genome_of(&[0, 1, 2], 0, &config);
        assert_eq!(rng.recombine(&parent, &parent, &config).len(), 3);
    }

    #[test]
    fn test_deletion_keeps_one_gene() {
        let mut rng = SimRng::new(9);
        let config = genetics(RateConfig {
            deletion: 1.0,
            ..no_mutation()
        });
        let parent = genome_of(&[7], 1, &config);
        assert_eq!(rng.recombine(&parent, &parent, &config).len(), 1);
    }

    #[test]
    fn test_rate_crossover_keeps_parental_bits() {
        let mut rng = SimRng::new(11);
        let a = MutationRates::from_probabilities([0.1, 0.2, 0.3, 0.4, 0.0], false, 0.0);
        let b = MutationRates::from_probabilities([0.9, 0.8, 0.7, 0.6, 0.0], false, 0.0);

        let mut child = rng.crossover_rates(&a, &b);
        let meta = child.rate(MutationParameter::Meta);
        rng.bit_flip(&mut child, meta);

        for parameter in MutationParameter::ALL {
            let (x, y) = (a.parameter(parameter), b.parameter(parameter));
            let c = child.parameter(parameter);
            assert_eq!((c ^ x) & (c ^ y), 0, "{parameter:?} has a non-parental bit");
        }
    }

    #[test]
    fn test_bit_flip_certain() {
        let mut rng = SimRng::new(0);
        let mut rates = MutationRates::from_probabilities([0.0; 5], false, 0.0);
        rng.bit_flip(&mut rates, 1.0);
        for parameter in MutationParameter::ALL {
            assert_eq!(rates.parameter(parameter), u16::MAX);
        }
    }

    #[test]
    fn test_bit_flip_single_structural() {
        let mut rng = SimRng::new(0);
        let mut rates = MutationRates::from_probabilities([0.0; 5], true, 0.0);
        rng.bit_flip(&mut rates, 1.0);

        assert_eq!(rates.parameter(MutationParameter::Insertion), u16::MAX);
        assert_eq!(rates.parameter(MutationParameter::Flip), u16::MAX);
        assert_eq!(
            rates.parameter(MutationParameter::Deletion),
            rates.parameter(MutationParameter::Insertion)
        );
        assert_eq!(rate_parameters(&rates).count(), MutationParameter::ALL.len() - 1);
    }

    #[test]
    fn test_absent_index_skips_present() {
        let mut rng = SimRng::new(5);
        let config = GeneticsConfig::default();
        let genome = genome_of(&(0..521).collect::<Vec<_>>(), 0, &config);
        for _ in 0..10 {
            assert_eq!(rng.absent_index(&genome, 522), Some(521));
        }

        let full = genome_of(&(0..522).collect::<Vec<_>>(), 0, &config);
        assert_eq!(rng.absent_index(&full, 522), None);
    }

    #[test]
    fn test_seeded_reproducible() {
        let config = GeneticsConfig::default();
        let a = SimRng::new(99).random_genome(20, false, &config).unwrap();
        let b = SimRng::new(99).random_genome(20, false, &config).unwrap();
        assert_eq!(a, b);
    }
}
