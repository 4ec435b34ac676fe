//! Tile pyramid addressing
//!
//! A [`TilePyramid`] is an immutable description of a multi-resolution tile
//! hierarchy over a geographic [`Sector`]: a list of [`Level`]s whose angular
//! tile size halves at each step. Levels are generated once at construction
//! and never change, so the pyramid can be cloned freely into worker-side
//! fetchers.

mod key;

pub use key::{TileKey, MAX_TILE_INDEX};

use thiserror::Error;

use crate::geom::Sector;

/// Maximum number of levels a pyramid may hold (level ordinals are 8 bits).
pub const MAX_LEVELS: usize = 256;

/// Errors raised by pyramid construction and level selection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PyramidError {
    /// Resolution passed to [`TilePyramid::level_for_resolution`] was not a
    /// positive finite number.
    #[error("resolution must be a positive finite value, got {0}")]
    InvalidResolution(f64),

    /// A constructor argument was out of range.
    #[error("invalid pyramid configuration: {0}")]
    InvalidConfiguration(String),

    /// A level's tile grid exceeded the addressable range.
    #[error("level {ordinal} exceeds addressable tile range ({rows}x{columns} tiles)")]
    LevelOverflow { ordinal: usize, rows: u64, columns: u64 },
}

/// One level of a tile pyramid.
///
/// `tile_delta` is the angular size of one tile in degrees; `level_width`
/// and `level_height` are the full raster dimensions of the level in pixels
/// (tile count times tile size).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    /// Geographic extent shared by all levels of the pyramid.
    pub sector: Sector,
    /// Position of this level in the pyramid, 0 being the coarsest.
    pub ordinal: u8,
    /// Angular size of one tile in degrees.
    pub tile_delta: f64,
    /// Width of one tile in pixels.
    pub tile_width: u32,
    /// Height of one tile in pixels.
    pub tile_height: u32,
    /// Width of the level's full raster in pixels.
    pub level_width: u32,
    /// Height of the level's full raster in pixels.
    pub level_height: u32,
}

impl Level {
    /// Number of tile columns in this level.
    #[inline]
    pub fn num_columns(&self) -> u32 {
        self.level_width / self.tile_width
    }

    /// Number of tile rows in this level.
    #[inline]
    pub fn num_rows(&self) -> u32 {
        self.level_height / self.tile_height
    }

    /// Angular resolution of this level in degrees per pixel.
    #[inline]
    pub fn degrees_per_pixel(&self) -> f64 {
        self.sector.delta_latitude() / self.level_height as f64
    }

    /// Geographic bounds of the tile at `row`, `column`.
    ///
    /// Row 0 is the northernmost row; column 0 the westernmost column.
    pub fn tile_sector(&self, row: u32, column: u32) -> Sector {
        let delta_lat = self.sector.delta_latitude() / self.num_rows() as f64;
        let delta_lon = self.sector.delta_longitude() / self.num_columns() as f64;
        let min_lat = self.sector.max_latitude() - delta_lat * (row + 1) as f64;
        let min_lon = self.sector.min_longitude() + delta_lon * column as f64;
        Sector::new(min_lat, min_lat + delta_lat, min_lon, min_lon + delta_lon)
    }
}

/// Immutable description of a multi-resolution tile hierarchy.
#[derive(Debug, Clone)]
pub struct TilePyramid {
    sector: Sector,
    first_level_delta: f64,
    tile_width: u32,
    tile_height: u32,
    levels: Vec<Level>,
}

impl TilePyramid {
    /// Creates a pyramid of `num_levels` levels over `sector`, where the
    /// coarsest level's tiles are `first_level_delta` degrees across and
    /// each subsequent level halves the angular tile size.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::InvalidConfiguration`] for a non-positive
    /// first-level delta, zero tile dimensions, an empty sector, or a level
    /// count outside `1..=256`, and [`PyramidError::LevelOverflow`] when a
    /// level's tile grid would exceed the 28-bit addressable range.
    pub fn new(
        sector: Sector,
        first_level_delta: f64,
        tile_width: u32,
        tile_height: u32,
        num_levels: usize,
    ) -> Result<Self, PyramidError> {
        if !(first_level_delta > 0.0) || !first_level_delta.is_finite() {
            return Err(PyramidError::InvalidConfiguration(format!(
                "first level delta must be positive, got {first_level_delta}"
            )));
        }
        if tile_width < 1 || tile_height < 1 {
            return Err(PyramidError::InvalidConfiguration(format!(
                "tile dimensions must be at least 1x1, got {tile_width}x{tile_height}"
            )));
        }
        if num_levels < 1 || num_levels > MAX_LEVELS {
            return Err(PyramidError::InvalidConfiguration(format!(
                "level count must be in 1..={MAX_LEVELS}, got {num_levels}"
            )));
        }
        if sector.delta_latitude() <= 0.0 || sector.delta_longitude() <= 0.0 {
            return Err(PyramidError::InvalidConfiguration(
                "sector must have positive extent".to_string(),
            ));
        }

        let mut levels = Vec::with_capacity(num_levels);
        for ordinal in 0..num_levels {
            let tile_delta = first_level_delta / 2f64.powi(ordinal as i32);
            let columns = (sector.delta_longitude() / tile_delta).round().max(1.0) as u64;
            let rows = (sector.delta_latitude() / tile_delta).round().max(1.0) as u64;
            if rows > (MAX_TILE_INDEX as u64 + 1) || columns > (MAX_TILE_INDEX as u64 + 1) {
                return Err(PyramidError::LevelOverflow { ordinal, rows, columns });
            }
            let level_width = columns
                .checked_mul(tile_width as u64)
                .filter(|&w| w <= u32::MAX as u64)
                .ok_or(PyramidError::LevelOverflow { ordinal, rows, columns })?;
            let level_height = rows
                .checked_mul(tile_height as u64)
                .filter(|&h| h <= u32::MAX as u64)
                .ok_or(PyramidError::LevelOverflow { ordinal, rows, columns })?;

            levels.push(Level {
                sector,
                ordinal: ordinal as u8,
                tile_delta,
                tile_width,
                tile_height,
                level_width: level_width as u32,
                level_height: level_height as u32,
            });
        }

        Ok(Self {
            sector,
            first_level_delta,
            tile_width,
            tile_height,
            levels,
        })
    }

    /// Geographic extent covered by the pyramid.
    #[inline]
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    /// Angular tile size of the coarsest level in degrees.
    #[inline]
    pub fn first_level_delta(&self) -> f64 {
        self.first_level_delta
    }

    /// Number of levels in the pyramid.
    #[inline]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The level at `ordinal`, or `None` when out of range.
    pub fn level(&self, ordinal: u8) -> Option<&Level> {
        self.levels.get(ordinal as usize)
    }

    /// The finest (last) level of the pyramid.
    pub fn last_level(&self) -> &Level {
        // Construction guarantees at least one level.
        &self.levels[self.levels.len() - 1]
    }

    /// Selects the level whose resolution is nearest the target resolution,
    /// given in radians per pixel.
    ///
    /// The fractional level is `log2(first_level_resolution / target)`,
    /// rounded to the nearest integer and clamped to the available range, so
    /// a valid resolution always selects a level: finer than the last level
    /// returns the finest, coarser than the first returns the coarsest.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::InvalidResolution`] when the argument is not
    /// a positive finite number.
    pub fn level_for_resolution(&self, radians_per_pixel: f64) -> Result<&Level, PyramidError> {
        if !(radians_per_pixel > 0.0) || !radians_per_pixel.is_finite() {
            return Err(PyramidError::InvalidResolution(radians_per_pixel));
        }

        let degrees_per_pixel = radians_per_pixel.to_degrees();
        let first_level_degrees_per_pixel =
            self.first_level_delta / self.tile_width.min(self.tile_height) as f64;
        let fractional_level = (first_level_degrees_per_pixel / degrees_per_pixel).log2();
        let ordinal = fractional_level
            .round()
            .clamp(0.0, (self.levels.len() - 1) as f64) as usize;

        Ok(&self.levels[ordinal])
    }
}
