//! Shared world tile state.
//!
//! Barcodes read their input from, and trade tiles with, a [`TileGrid`]. The
//! world driver owns the only [`TileMap`].

use crate::schema::Rect;

/// Access to the shared binary world grid.
pub trait TileGrid {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// Whether the tile at (x, y) is active.
    fn get(&self, x: usize, y: usize) -> bool;

    /// Set the tile at (x, y).
    fn set(&mut self, x: usize, y: usize, active: bool);

    /// Cells of a rectangle, row-major, as 0/1. Out-of-bounds cells read 0.
    fn region_cells(&self, rect: &Rect) -> Vec<u8> {
        let mut cells = Vec::with_capacity(rect.area());
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                cells.push(u8::from(self.in_bounds(x, y) && self.get(x as usize, y as usize)));
            }
        }
        cells
    }

    /// Cells of a rectangle as a binary string.
    fn region(&self, rect: &Rect) -> String {
        self.region_cells(rect)
            .into_iter()
            .map(|c| if c == 1 { '1' } else { '0' })
            .collect()
    }

    /// Number of in-bounds tiles in `rect` whose state equals `active`.
    fn count_in(&self, rect: &Rect, active: bool) -> usize {
        let mut count = 0;
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                if self.in_bounds(x, y) && self.get(x as usize, y as usize) == active {
                    count += 1;
                }
            }
        }
        count
    }

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }
}

/// Flat row-major binary world map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMap {
    width: usize,
    height: usize,
    tiles: Vec<u8>,
}

impl TileMap {
    /// All-inactive map.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            tiles: vec![0; width * height],
        }
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Number of active tiles.
    pub fn count_active(&self) -> usize {
        self.tiles.iter().filter(|&&t| t != 0).count()
    }

    /// Deactivate every tile.
    pub fn clear(&mut self) {
        self.tiles.fill(0);
    }
}

impl TileGrid for TileMap {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn get(&self, x: usize, y: usize) -> bool {
        self.tiles[self.idx(x, y)] != 0
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, active: bool) {
        let idx = self.idx(x, y);
        self.tiles[idx] = u8::from(active);
    }
}
