//! Pattern index: the bijection between gene indices and neighbourhood patterns.
//!
//! Within a band, `index - base` is the neighbourhood read row-major with the
//! first cell as the most significant bit. Patterns are kept packed as that
//! integer key so encoding an observed neighbourhood never allocates.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;

use crate::schema::{GENE_INDEX_LIMIT, GeneBand, GeneIndex};

/// Pattern index errors. These indicate programming mistakes, not runtime
/// conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Gene index {0} is past the largest band (indices must be below {limit})", limit = GENE_INDEX_LIMIT)]
    InvalidGeneIndex(GeneIndex),
    #[error("Pattern length {0} matches no band (expected 1, 3, 9 or 25)")]
    InvalidPatternLength(usize),
    #[error("Pattern cell {0:?} is not '0' or '1'")]
    InvalidCell(char),
}

/// A binary neighbourhood pattern belonging to one band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pattern {
    band: GeneBand,
    key: u32,
}

impl Pattern {
    /// Pattern with the given packed key.
    #[inline]
    pub fn from_key(band: GeneBand, key: u32) -> Self {
        debug_assert!(key < band.size());
        Self { band, key }
    }

    /// Pack cells (row-major, any non-zero value counts as set).
    pub fn from_cells<I>(band: GeneBand, cells: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut key = 0u32;
        let mut len = 0usize;
        for cell in cells {
            len += 1;
            if len <= band.pattern_len() {
                key = (key << 1) | u32::from(cell != 0);
            }
        }
        if len != band.pattern_len() {
            return Err(PatternError::InvalidPatternLength(len));
        }
        Ok(Self { band, key })
    }

    #[inline]
    pub fn band(&self) -> GeneBand {
        self.band
    }

    #[inline]
    pub fn key(&self) -> u32 {
        self.key
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.band.pattern_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Cell `i` in row-major order.
    #[inline]
    pub fn cell(&self, i: usize) -> u8 {
        ((self.key >> (self.len() - 1 - i)) & 1) as u8
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len()).map(|i| self.cell(i))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in self.cells() {
            f.write_str(if cell == 1 { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len = s.chars().count();
        let band = GeneBand::ALL
            .into_iter()
            .find(|band| band.pattern_len() == len)
            .ok_or(PatternError::InvalidPatternLength(len))?;
        let cells = s
            .chars()
            .map(|c| match c {
                '0' => Ok(0),
                '1' => Ok(1),
                other => Err(PatternError::InvalidCell(other)),
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Pattern::from_cells(band, cells)
    }
}

/// Pattern a gene index matches.
pub fn decode(index: GeneIndex) -> Result<Pattern, PatternError> {
    let band = GeneBand::of(index).ok_or(PatternError::InvalidGeneIndex(index))?;
    Ok(Pattern::from_key(band, index - band.base()))
}

/// Gene index of a pattern.
#[inline]
pub fn encode(pattern: &Pattern) -> GeneIndex {
    pattern.band.base() + pattern.key
}

/// Lookup table for one band, indexed by packed pattern key.
#[derive(Debug, Clone)]
struct BandTable {
    band: GeneBand,
    indices: Vec<GeneIndex>,
}

/// Precomputed pattern → gene index lookup for a set of bands.
#[derive(Debug, Clone)]
pub struct PatternMap {
    tables: Vec<BandTable>,
}

impl PatternMap {
    /// Build the map for the given bands.
    ///
    /// Slots are filled in parallel; every slot is written exactly once.
    pub fn build<I>(bands: I) -> Self
    where
        I: IntoIterator<Item = GeneBand>,
    {
        let tables = bands
            .into_iter()
            .map(|band| {
                let mut indices = vec![0 as GeneIndex; band.size() as usize];
                indices.par_iter_mut().enumerate().for_each(|(key, slot)| {
                    let pattern = Pattern::from_key(band, key as u32);
                    *slot = encode(&pattern);
                    debug_assert_eq!(decode(*slot), Ok(pattern));
                });
                BandTable { band, indices }
            })
            .collect();
        Self { tables }
    }

    /// Whether the map holds entries for `band`.
    pub fn covers(&self, band: GeneBand) -> bool {
        self.tables.iter().any(|t| t.band == band)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.indices.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gene index for a pattern, if the pattern's band is covered.
    #[inline]
    pub fn lookup(&self, pattern: &Pattern) -> Option<GeneIndex> {
        self.lookup_key(pattern.band, pattern.key)
    }

    /// Gene index for a packed key in `band`.
    #[inline]
    pub fn lookup_key(&self, band: GeneBand, key: u32) -> Option<GeneIndex> {
        self.tables
            .iter()
            .find(|t| t.band == band)
            .and_then(|t| t.indices.get(key as usize))
            .copied()
    }
}

/// The short (up to 3x3) and optional long (5x5) pattern maps.
///
/// Built once at start-up and shared by every barcode.
#[derive(Debug, Clone)]
pub struct PatternMaps {
    short: PatternMap,
    long: Option<PatternMap>,
}

impl PatternMaps {
    /// Build the short map, and the long map if `max_band` includes 5x5.
    pub fn initialise(max_band: GeneBand) -> Self {
        let short = PatternMap::build(GeneBand::ThreeByThree.up_to());
        log::debug!("Built short pattern map ({} entries)", short.len());

        let long = (max_band >= GeneBand::FiveByFive).then(|| {
            let map = PatternMap::build([GeneBand::FiveByFive]);
            log::info!("Built long pattern map ({} entries)", map.len());
            map
        });

        Self { short, long }
    }

    #[inline]
    pub fn short(&self) -> &PatternMap {
        &self.short
    }

    #[inline]
    pub fn long(&self) -> Option<&PatternMap> {
        self.long.as_ref()
    }

    /// Map responsible for `band`.
    #[inline]
    pub fn for_band(&self, band: GeneBand) -> Option<&PatternMap> {
        match band {
            GeneBand::FiveByFive => self.long(),
            _ => Some(&self.short),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lengths() {
        assert_eq!(decode(0).unwrap().len(), 1);
        assert_eq!(decode(2).unwrap().len(), 3);
        assert_eq!(decode(10).unwrap().len(), 9);
        assert_eq!(decode(522).unwrap().len(), 25);
        assert_eq!(decode(GENE_INDEX_LIMIT - 1).unwrap().len(), 25);
    }

    #[test]
    fn test_decode_invalid() {
        assert_eq!(
            decode(GENE_INDEX_LIMIT),
            Err(PatternError::InvalidGeneIndex(GENE_INDEX_LIMIT))
        );
    }

    #[test]
    fn test_decode_bits_msb_first() {
        assert_eq!(decode(0).unwrap().to_string(), "0");
        assert_eq!(decode(1).unwrap().to_string(), "1");
        assert_eq!(decode(2).unwrap().to_string(), "000");
        assert_eq!(decode(3).unwrap().to_string(), "001");
        assert_eq!(decode(6).unwrap().to_string(), "100");
        assert_eq!(decode(9).unwrap().to_string(), "111");
        assert_eq!(decode(10 + 256).unwrap().to_string(), "100000000");
        assert_eq!(decode(521).unwrap().to_string(), "111111111");
    }

    #[test]
    fn test_parse_roundtrip() {
        let pattern: Pattern = "010111010".parse().unwrap();
        assert_eq!(pattern.band(), GeneBand::ThreeByThree);
        assert_eq!(decode(encode(&pattern)).unwrap(), pattern);
        assert_eq!(
            "0101".parse::<Pattern>(),
            Err(PatternError::InvalidPatternLength(4))
        );
        assert_eq!("01x".parse::<Pattern>(), Err(PatternError::InvalidCell('x')));
    }

    #[test]
    fn test_from_cells_length_checked() {
        assert_eq!(
            Pattern::from_cells(GeneBand::ThreeCell, [1, 0]),
            Err(PatternError::InvalidPatternLength(2))
        );
        assert_eq!(
            Pattern::from_cells(GeneBand::ThreeCell, [1, 0, 1, 1]),
            Err(PatternError::InvalidPatternLength(4))
        );
        assert_eq!(
            Pattern::from_cells(GeneBand::ThreeCell, [0; 9]),
            Err(PatternError::InvalidPatternLength(9))
        );
        let pattern = Pattern::from_cells(GeneBand::ThreeCell, [1, 0, 1]).unwrap();
        assert_eq!(encode(&pattern), 2 + 0b101);
    }

    #[test]
    fn test_short_map_agrees_with_encode() {
        let map = PatternMap::build(GeneBand::ThreeByThree.up_to());
        assert_eq!(map.len(), 2 + 8 + 512);
        assert!(!map.covers(GeneBand::FiveByFive));

        for index in 0..GeneBand::ThreeByThree.end() {
            let pattern = decode(index).unwrap();
            assert_eq!(map.lookup(&pattern), Some(index));
        }
    }

    #[test]
    fn test_maps_skip_long_band_when_not_configured() {
        let maps = PatternMaps::initialise(GeneBand::ThreeByThree);
        assert!(maps.long().is_none());
        assert!(maps.for_band(GeneBand::FiveByFive).is_none());
        assert!(maps.for_band(GeneBand::OneCell).is_some());
    }

    #[test]
    fn test_long_map_roundtrip() {
        let maps = PatternMaps::initialise(GeneBand::FiveByFive);
        let long = maps.long().unwrap();
        for index in (522..GENE_INDEX_LIMIT).step_by(4099) {
            let pattern = decode(index).unwrap();
            assert_eq!(long.lookup(&pattern), Some(index));
        }
    }
}
