use barcode_life::compute::{Barcode, PatternMap, PatternMaps, SimRng, decode, encode};
use barcode_life::schema::{
    GENE_INDEX_LIMIT, GeneBand, GeneEncoding, GeneIndex, GeneticsConfig, Genome, MutationRates,
    RateConfig,
};
use proptest::prelude::*;

/// Gene indices whose pattern is all zeros.
const EMPTY_PATTERNS: [GeneIndex; 3] = [0, 2, 10];

fn quiet_genetics() -> GeneticsConfig {
    GeneticsConfig {
        initial_rates: RateConfig {
            flip: 0.0,
            insertion: 0.0,
            deletion: 0.0,
            trans: 0.0,
            meta: 0.0,
        },
        ..GeneticsConfig::default()
    }
}

prop_compose! {
    fn arb_genome(max_len: usize)(
        genes in prop::collection::btree_map(0..GeneBand::ThreeByThree.end(), 0u8..2, 0..max_len)
    ) -> Genome {
        Genome::from_genes(genes, GeneEncoding::Behaviour, MutationRates::default()).unwrap()
    }
}

prop_compose! {
    fn arb_barcode(width: usize, height: usize)(
        cells in prop::collection::vec(0u8..2, width * height)
    ) -> Barcode {
        Barcode::from_cells(width, height, cells).unwrap()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn test_decode_encode_roundtrip(index in 0..GENE_INDEX_LIMIT) {
        let pattern = decode(index).unwrap();
        prop_assert_eq!(encode(&pattern), index);
        prop_assert_eq!(pattern.len(), pattern.band().pattern_len());
    }

    #[test]
    fn test_decode_rejects_past_last_band(index in GENE_INDEX_LIMIT..) {
        prop_assert!(decode(index).is_err());
    }

    #[test]
    fn test_zero_grid_unchanged(genome in arb_genome(64)) {
        let mut genome = genome;
        for index in EMPTY_PATTERNS {
            genome.remove(index);
        }
        let maps = PatternMaps::initialise(GeneBand::ThreeByThree);
        let mut barcode = Barcode::new(16, 16);
        let report = barcode.update(&genome, &maps);

        prop_assert_eq!(barcode.count_live_cells(), 0);
        prop_assert_eq!(report.total_applied(), 0);
    }

    #[test]
    fn test_self_intersect_subtract_clears(barcode in arb_barcode(8, 8)) {
        let mut grid = barcode.clone();
        grid.intersect(&barcode);
        grid.subtract(&barcode);
        prop_assert_eq!(grid.count_live_cells(), 0);
    }

    #[test]
    fn test_subtract_idempotent(a in arb_barcode(8, 8), b in arb_barcode(8, 8)) {
        let mut once = a.clone();
        once.subtract(&b);
        let mut twice = once.clone();
        twice.subtract(&b);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_repr_roundtrip(barcode in arb_barcode(5, 7)) {
        let parsed = Barcode::from_repr(5, 7, &barcode.to_string()).unwrap();
        prop_assert_eq!(parsed, barcode);
    }

    #[test]
    fn test_update_never_grows_alphabet(genome in arb_genome(64), barcode in arb_barcode(12, 12)) {
        let maps = PatternMaps::initialise(GeneBand::ThreeByThree);
        let mut barcode = barcode;
        barcode.update(&genome, &maps);
        prop_assert!(barcode.cells().iter().all(|&c| c < 2));
    }

    #[test]
    fn test_recombine_length_and_uniqueness(
        first in arb_genome(40),
        second in arb_genome(40),
        seed in any::<u64>()
    ) {
        let genetics = quiet_genetics();
        let mut rng = SimRng::new(seed);
        let child = rng.recombine(&first, &second, &genetics);

        let (l1, l2) = (first.len(), second.len());
        let distinct = first.len() + second.indices().filter(|&i| !first.contains(i)).count();
        prop_assert!(child.len() >= l1.min(l2).min(distinct));
        prop_assert!(child.len() <= l1.max(l2));

        let indices: Vec<_> = child.indices().collect();
        let mut deduped = indices.clone();
        deduped.dedup();
        prop_assert_eq!(indices, deduped);
        for (index, value) in child.iter() {
            prop_assert!(first.get(index) == Some(value) || second.get(index) == Some(value));
        }
    }

    #[test]
    fn test_mutated_offspring_stay_legal(
        first in arb_genome(40),
        second in arb_genome(40),
        seed in any::<u64>()
    ) {
        let genetics = GeneticsConfig {
            rates_evolve: true,
            ..GeneticsConfig::default()
        };
        let noisy = MutationRates::from_probabilities([0.5, 0.5, 0.5, 0.5, 0.1], false, 0.001);
        let mut first = first;
        let mut second = second;
        *first.rates_mut() = noisy;
        *second.rates_mut() = noisy;

        let mut rng = SimRng::new(seed);
        let child = rng.recombine(&first, &second, &genetics);

        prop_assert!(child.len() <= first.len().max(second.len()) + 1);
        prop_assert!(child.indices().all(|i| i < genetics.gene_limit()));
        prop_assert!(child.iter().all(|(_, v)| v < 2));
        prop_assert!(!child.has_large_patterns());
    }
}

#[test]
fn test_short_map_roundtrip_every_index() {
    let map = PatternMap::build(GeneBand::ThreeByThree.up_to());
    for index in 0..GeneBand::ThreeByThree.end() {
        let pattern = decode(index).unwrap();
        assert_eq!(map.lookup(&pattern), Some(index));
        assert_eq!(decode(map.lookup(&pattern).unwrap()).unwrap(), pattern);
    }
}
