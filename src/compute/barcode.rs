//! Barcode - an agent's grid and the genome-driven update engine.
//!
//! Each step the grid is snapshotted, every rule family scans the positions
//! where its neighbourhood fits, and genes present in the genome rewrite the
//! neighbourhood centre. Families run in band order (1-cell, 3-cell, 3x3,
//! 5x5), so a later family wins when two write the same centre.

use std::fmt;
use std::ops::Range;

use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::schema::{GeneBand, Genome, Rect, VitalityNormalisation};

use super::{PatternMap, PatternMaps, TileGrid};

/// Barcode string-form errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BarcodeError {
    #[error("Barcode representation has {actual} cells, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Barcode cell {0:?} is not a decimal digit")]
    InvalidCell(char),
}

/// Shape of a rule family's neighbourhood.
///
/// All edge exclusion goes through [`Neighbourhood::centres`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbourhood {
    pub cols: usize,
    pub rows: usize,
}

impl Neighbourhood {
    pub const fn of(band: GeneBand) -> Self {
        let (cols, rows) = band.shape();
        Self { cols, rows }
    }

    /// Centre coordinates (x range, y range) whose whole neighbourhood lies
    /// inside a `width` x `height` grid.
    pub fn centres(&self, width: usize, height: usize) -> (Range<usize>, Range<usize>) {
        if width < self.cols || height < self.rows {
            return (0..0, 0..0);
        }
        let (hx, hy) = (self.cols / 2, self.rows / 2);
        (hx..width - hx, hy..height - hy)
    }

    /// Number of centre positions.
    pub fn candidate_positions(&self, width: usize, height: usize) -> usize {
        let (xs, ys) = self.centres(width, height);
        xs.len() * ys.len()
    }
}

/// What one update step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Genes applied per band, ordered as [`GeneBand::ALL`].
    pub applied: [usize; 4],
    /// Summed signed vitality deltas per band.
    pub vitality: [i64; 4],
    /// Candidate centre positions per band.
    pub candidates: [usize; 4],
}

impl UpdateReport {
    /// Total number of centre writes.
    pub fn total_applied(&self) -> usize {
        self.applied.iter().sum()
    }

    /// Vitality change of this step under a normalisation policy.
    pub fn normalised_vitality(&self, policy: VitalityNormalisation) -> f64 {
        self.vitality
            .iter()
            .zip(self.candidates.iter())
            .map(|(&sum, &candidates)| match policy {
                VitalityNormalisation::CandidatePositions if candidates == 0 => 0.0,
                VitalityNormalisation::CandidatePositions => sum as f64 / candidates as f64,
                VitalityNormalisation::Fixed { divisor } => sum as f64 / divisor,
            })
            .sum()
    }
}

/// Movement and activity derived from a barcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Movement vector, truncated to whole cells.
    pub movement: (i32, i32),
    /// Active cells inside the metric border.
    pub cells_active: usize,
}

#[derive(Debug, Clone, Copy)]
enum Lookup<'a> {
    /// Pattern key is the offset within the band.
    Direct,
    Map(&'a PatternMap),
}

#[derive(Debug, Clone)]
struct Family<'a> {
    band: GeneBand,
    neighbourhood: Neighbourhood,
    lookup: Lookup<'a>,
    xs: Range<usize>,
    ys: Range<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RowTally {
    applied: [usize; 4],
    vitality: [i64; 4],
}

impl RowTally {
    fn merge(mut self, other: Self) -> Self {
        for b in 0..4 {
            self.applied[b] += other.applied[b];
            self.vitality[b] += other.vitality[b];
        }
        self
    }
}

/// An agent's fixed-size grid of small cell states.
#[derive(Debug, Clone)]
pub struct Barcode {
    width: usize,
    height: usize,
    /// Row-major cell states.
    cells: Vec<u8>,
    /// Read-only copy of `cells` taken at the start of each update.
    snapshot: Vec<u8>,
}

impl PartialEq for Barcode {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.cells == other.cells
    }
}

impl Eq for Barcode {}

impl Barcode {
    /// All-zero barcode.
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "Barcode dimensions must be non-zero");
        let size = width * height;
        Self {
            width,
            height,
            cells: vec![0; size],
            snapshot: vec![0; size],
        }
    }

    /// Barcode over existing row-major cells.
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Result<Self, BarcodeError> {
        let mut barcode = Self::new(width, height);
        if cells.len() != barcode.len() {
            return Err(BarcodeError::LengthMismatch {
                expected: barcode.len(),
                actual: cells.len(),
            });
        }
        barcode.cells = cells;
        Ok(barcode)
    }

    /// Parse the string form produced by `Display`.
    pub fn from_repr(width: usize, height: usize, repr: &str) -> Result<Self, BarcodeError> {
        let mut barcode = Self::new(width, height);
        barcode.set_repr(repr)?;
        Ok(barcode)
    }

    /// Replace the cells from a string form of matching size.
    pub fn set_repr(&mut self, repr: &str) -> Result<(), BarcodeError> {
        let actual = repr.chars().count();
        if actual != self.len() {
            return Err(BarcodeError::LengthMismatch {
                expected: self.len(),
                actual,
            });
        }
        for (cell, c) in self.cells.iter_mut().zip(repr.chars()) {
            *cell = c.to_digit(10).ok_or(BarcodeError::InvalidCell(c))? as u8;
        }
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        let idx = self.idx(x, y);
        self.cells[idx] = value;
    }

    /// World rectangle covered when the barcode sits at (x, y).
    pub fn footprint(&self, x: usize, y: usize) -> Rect {
        Rect::new(x as i32, y as i32, self.width as i32, self.height as i32)
    }

    /// Copy another barcode's cells without reallocating.
    pub fn copy_from(&mut self, other: &Barcode) {
        self.cells.copy_from_slice(&other.cells);
    }

    /// Overlay external cells additively: active inputs set cells, nothing
    /// is ever cleared.
    pub fn input(&mut self, region: &[u8]) {
        debug_assert_eq!(region.len(), self.cells.len());
        for (cell, &external) in self.cells.iter_mut().zip(region) {
            if external != 0 {
                *cell = 1;
            }
        }
    }

    /// Overlay the world tiles under the barcode at (x, y).
    pub fn input_from<G: TileGrid>(&mut self, grid: &G, x: usize, y: usize) {
        let region = grid.region_cells(&self.footprint(x, y));
        self.input(&region);
    }

    /// Keep only cells also set in `other`.
    pub fn intersect(&mut self, other: &Barcode) {
        for (cell, &theirs) in self.cells.iter_mut().zip(&other.cells) {
            if theirs == 0 {
                *cell = 0;
            }
        }
    }

    /// Clear every cell that is set in `other`.
    pub fn subtract(&mut self, other: &Barcode) {
        for (cell, &theirs) in self.cells.iter_mut().zip(&other.cells) {
            if theirs != 0 {
                *cell = 0;
            }
        }
    }

    pub fn count_live_cells(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }

    /// Live cells as a fraction of all cells.
    pub fn live_fraction(&self) -> f64 {
        self.count_live_cells() as f64 / self.len() as f64
    }

    /// Advance one step using `genome`'s rules.
    ///
    /// Rows are processed in parallel. Every row reads only the snapshot and
    /// writes only itself, so the result matches a sequential scan.
    pub fn update(&mut self, genome: &Genome, maps: &PatternMaps) -> UpdateReport {
        let (width, height) = (self.width, self.height);

        let mut report = UpdateReport::default();
        for band in GeneBand::ALL {
            report.candidates[band as usize] =
                Neighbourhood::of(band).candidate_positions(width, height);
        }

        let families: Vec<Family<'_>> = GeneBand::ALL
            .into_iter()
            .filter(|&band| genome.has_band(band))
            .filter_map(|band| {
                let lookup = match band {
                    GeneBand::OneCell | GeneBand::ThreeCell => Lookup::Direct,
                    _ => Lookup::Map(maps.for_band(band)?),
                };
                let neighbourhood = Neighbourhood::of(band);
                let (xs, ys) = neighbourhood.centres(width, height);
                Some(Family {
                    band,
                    neighbourhood,
                    lookup,
                    xs,
                    ys,
                })
            })
            .collect();

        if families.is_empty() {
            return report;
        }

        self.snapshot.copy_from_slice(&self.cells);
        let snapshot = &self.snapshot;
        let families = &families;

        let tally = self
            .cells
            .par_chunks_mut(width)
            .enumerate()
            .map(|(y, row)| update_row(y, row, snapshot, width, families, genome))
            .reduce(RowTally::default, RowTally::merge);

        report.applied = tally.applied;
        report.vitality = tally.vitality;
        report
    }

    /// Movement vector and active-cell count.
    ///
    /// Cells within `border` of an edge are ignored. Each active cell pushes
    /// in the direction picked by its linear index modulo 4 (+x, +y, -x, -y),
    /// scaled by the matching weight.
    pub fn compute_metrics(&self, border: usize, weights: [f32; 4]) -> Metrics {
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;
        let mut cells_active = 0;

        for y in border..self.height.saturating_sub(border) {
            for x in border..self.width.saturating_sub(border) {
                let i = self.idx(x, y);
                if self.cells[i] == 0 {
                    continue;
                }
                cells_active += 1;
                match i % 4 {
                    0 => dx += weights[0],
                    1 => dy += weights[1],
                    2 => dx -= weights[2],
                    _ => dy -= weights[3],
                }
            }
        }

        Metrics {
            movement: (dx as i32, dy as i32),
            cells_active,
        }
    }

    /// Deactivate `count` random active world tiles under the barcode at
    /// (x, y). Nothing changes unless all `count` tiles are available.
    pub fn extract_tiles<G, R>(
        &self,
        grid: &mut G,
        x: usize,
        y: usize,
        count: usize,
        rng: &mut R,
    ) -> bool
    where
        G: TileGrid,
        R: Rng + ?Sized,
    {
        if count == 0 {
            return true;
        }
        if grid.count_in(&self.footprint(x, y), true) < count {
            return false;
        }

        let mut candidates: Vec<usize> = (0..self.len())
            .filter(|&i| {
                self.tile_in_bounds(grid, x, y, i)
                    && grid.get(x + i % self.width, y + i / self.width)
            })
            .collect();
        candidates.shuffle(rng);

        for &i in candidates.iter().take(count) {
            grid.set(x + i % self.width, y + i / self.width, false);
        }
        true
    }

    /// Activate up to `count` random inactive world tiles under the barcode
    /// at (x, y), restricted to positions of active cells when
    /// `use_active_cells`. Returns whether all `count` were placed.
    pub fn drop_tiles<G, R>(
        &self,
        grid: &mut G,
        x: usize,
        y: usize,
        count: usize,
        use_active_cells: bool,
        rng: &mut R,
    ) -> bool
    where
        G: TileGrid,
        R: Rng + ?Sized,
    {
        if count == 0 {
            return true;
        }

        let mut candidates: Vec<usize> = (0..self.len())
            .filter(|&i| {
                self.tile_in_bounds(grid, x, y, i)
                    && !grid.get(x + i % self.width, y + i / self.width)
                    && (!use_active_cells || self.cells[i] != 0)
            })
            .collect();
        candidates.shuffle(rng);

        let placed = candidates.len().min(count);
        for &i in &candidates[..placed] {
            grid.set(x + i % self.width, y + i / self.width, true);
        }
        placed == count
    }

    #[inline]
    fn tile_in_bounds<G: TileGrid>(&self, grid: &G, x: usize, y: usize, i: usize) -> bool {
        x + i % self.width < grid.width() && y + i / self.width < grid.height()
    }
}

/// Apply every family to one output row.
fn update_row(
    y: usize,
    row: &mut [u8],
    snapshot: &[u8],
    width: usize,
    families: &[Family<'_>],
    genome: &Genome,
) -> RowTally {
    let encoding = genome.encoding();
    let mut tally = RowTally::default();

    for family in families {
        if !family.ys.contains(&y) {
            continue;
        }
        let hx = family.neighbourhood.cols / 2;
        let top = y - family.neighbourhood.rows / 2;
        let b = family.band as usize;

        for x in family.xs.clone() {
            let key = pack(snapshot, width, x - hx, top, family.neighbourhood);
            let index = match family.lookup {
                Lookup::Direct => family.band.base() + key,
                Lookup::Map(map) => match map.lookup_key(family.band, key) {
                    Some(index) => index,
                    None => continue,
                },
            };
            if let Some(value) = genome.get(index) {
                row[x] = encoding.output(value);
                tally.applied[b] += 1;
                tally.vitality[b] += encoding.vitality(value);
            }
        }
    }

    tally
}

/// Pack a neighbourhood, row-major, first cell most significant.
#[inline]
fn pack(cells: &[u8], width: usize, left: usize, top: usize, neighbourhood: Neighbourhood) -> u32 {
    let mut key = 0u32;
    for r in 0..neighbourhood.rows {
        let start = (top + r) * width + left;
        for &cell in &cells[start..start + neighbourhood.cols] {
            key = (key << 1) | u32::from(cell != 0);
        }
    }
    key
}

/// One decimal digit per cell, row-major.
impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &cell in &self.cells {
            write!(f, "{}", char::from(b'0' + cell.min(9)))?;
        }
        Ok(())
    }
}
