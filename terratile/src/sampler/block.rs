//! Query-scoped tile assembly

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::pyramid::{Level, TileKey};

/// The set of tile arrays one query needs from a single level.
///
/// A block is assembled per query and never outlives it; tile arrays are
/// shared with the cache through `Arc` clones, so assembling a block copies
/// no sample data. Rows and columns record which tiles of the level the
/// query touches, which the extrema scan iterates directly.
pub(crate) struct TileBlock {
    level: Level,
    rows: BTreeSet<u32>,
    columns: BTreeSet<u32>,
    arrays: HashMap<TileKey, Arc<Vec<i16>>>,
}

impl TileBlock {
    pub(crate) fn new(level: Level) -> Self {
        Self {
            level,
            rows: BTreeSet::new(),
            columns: BTreeSet::new(),
            arrays: HashMap::new(),
        }
    }

    pub(crate) fn level(&self) -> &Level {
        &self.level
    }

    pub(crate) fn add_row(&mut self, row: u32) {
        self.rows.insert(row);
    }

    pub(crate) fn add_column(&mut self, column: u32) {
        self.columns.insert(column);
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = u32> + '_ {
        self.rows.iter().copied()
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = u32> + '_ {
        self.columns.iter().copied()
    }

    pub(crate) fn put_tile_array(&mut self, row: u32, column: u32, array: Arc<Vec<i16>>) {
        self.arrays
            .insert(TileKey::new(self.level.ordinal, row, column), array);
    }

    pub(crate) fn tile_array(&self, row: u32, column: u32) -> Option<&Arc<Vec<i16>>> {
        self.arrays
            .get(&TileKey::new(self.level.ordinal, row, column))
    }

    /// Reads the texel at tile-local coordinates `(i, j)` of the tile at
    /// `(row, column)`.
    ///
    /// Assembly guarantees every tile the read pass touches is present;
    /// a missing tile reads as NaN rather than panicking, which surfaces
    /// in the query result instead of taking the render thread down.
    pub(crate) fn read_texel(&self, row: u32, column: u32, i: u32, j: u32) -> f64 {
        self.tile_array(row, column).map_or(f64::NAN, |array| {
            array[(i + j * self.level.tile_width) as usize] as f64
        })
    }
}
