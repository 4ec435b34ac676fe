//! Multi-level block sampling with bilinear interpolation
//!
//! [`TiledBlockSampler`] answers point, grid, and extrema queries over a
//! tile pyramid without blocking the calling thread. A query picks the
//! level whose resolution best matches the requested grid spacing, then
//! descends toward the coarsest level until it finds one whose tiles are
//! all cached:
//!
//! ```text
//!   target level ──► all tiles cached? ──► sample and return
//!        │ no (schedule fetches)
//!        ▼
//!   coarser level ──► all tiles cached? ──► sample and return
//!        │ no
//!        ▼
//!       ...
//!        ▼
//!   level 0 ──► all tiles cached? ──► sample and return
//!        │ no (schedule fetches)
//!        ▼
//!   no data yet (NaN grid)
//! ```
//!
//! Background fetches are scheduled only at the target level and at level
//! 0, so intermediate levels serve purely as fallbacks and never generate
//! network traffic. Every missing tile at an enabled level gets its own
//! fetch, letting one query warm the whole block for the next frame.
//!
//! Grid values are sampled bilinearly from the level raster. On pyramids
//! covering the full sphere the horizontal texel coordinate wraps across
//! the antimeridian; on partial pyramids it clamps half a texel inside the
//! raster edge instead.

mod block;

use std::sync::Arc;

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::SamplerConfig;
use crate::geom::{fract, mod_floor, Sector};
use crate::pyramid::{Level, PyramidError, TileKey, TilePyramid};
use crate::resource::ResourceCacheAdapter;
use crate::retriever::{Fetcher, RetrieveError};

use block::TileBlock;

/// Errors raised by sampler construction and queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    /// Grid dimensions must be at least 1x1.
    #[error("grid dimensions must be at least 1x1, got {width}x{height}")]
    InvalidGrid { width: usize, height: usize },

    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors raised while fetching and decoding one tile's payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The tile source could not be reached or read.
    #[error("tile source unavailable: {0}")]
    Unavailable(String),

    /// The payload was not a valid sample raster.
    #[error("malformed tile payload: {0}")]
    Malformed(String),

    /// The payload decoded to the wrong number of samples.
    #[error("tile payload has {actual} samples, expected {expected}")]
    UnexpectedLength { expected: usize, actual: usize },
}

impl From<DecodeError> for RetrieveError {
    fn from(error: DecodeError) -> Self {
        RetrieveError::Failed(error.to_string())
    }
}

/// Maps a tile address to the locator its payload is fetched from,
/// typically a URL.
pub trait TileAddressResolver: Send + Sync {
    /// Returns the locator for the tile at `row`, `column` of `level`.
    fn resolve(&self, level: &Level, row: u32, column: u32) -> String;
}

impl<F> TileAddressResolver for F
where
    F: Fn(&Level, u32, u32) -> String + Send + Sync,
{
    fn resolve(&self, level: &Level, row: u32, column: u32) -> String {
        self(level, row, column)
    }
}

/// Fetches and decodes one tile's payload into a sample array.
///
/// Implementations own the transport (HTTP client, disk reader) and the
/// payload format; the sampler only sees the decoded samples. Called from
/// worker threads, so blocking is expected.
pub trait TileDecoder: Send + Sync {
    /// Decodes the tile behind `address` into `width * height` samples in
    /// row-major order, northernmost row first.
    fn decode(&self, address: &str, width: u32, height: u32)
        -> Result<Arc<Vec<i16>>, DecodeError>;
}

impl<F> TileDecoder for F
where
    F: Fn(&str, u32, u32) -> Result<Arc<Vec<i16>>, DecodeError> + Send + Sync,
{
    fn decode(
        &self,
        address: &str,
        width: u32,
        height: u32,
    ) -> Result<Arc<Vec<i16>>, DecodeError> {
        self(address, width, height)
    }
}

/// Bridges the retriever's fetch contract to the injected resolver and
/// decoder pair.
struct TileFetcher {
    pyramid: TilePyramid,
    resolver: Arc<dyn TileAddressResolver>,
    decoder: Arc<dyn TileDecoder>,
}

impl Fetcher<TileKey, Arc<Vec<i16>>> for TileFetcher {
    fn fetch(&self, key: &TileKey) -> Result<Arc<Vec<i16>>, RetrieveError> {
        let level = self
            .pyramid
            .level(key.level())
            .ok_or_else(|| RetrieveError::Failed(format!("no level {}", key.level())))?;
        let address = self.resolver.resolve(level, key.row(), key.column());
        let array = self
            .decoder
            .decode(&address, level.tile_width, level.tile_height)?;

        // Widen before multiplying; a level's texel count can exceed u32.
        let expected = level.tile_width as usize * level.tile_height as usize;
        if array.len() != expected {
            return Err(DecodeError::UnexpectedLength {
                expected,
                actual: array.len(),
            }
            .into());
        }
        Ok(array)
    }
}

/// Result of a grid query: row-major sample values plus the level that
/// supplied them.
///
/// Row 0 is the southernmost row, matching the query sector's latitude
/// ordering. Grid points the query could not answer are NaN; when no level
/// had a complete tile block, every value is NaN and `level` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    width: usize,
    height: usize,
    values: Vec<f32>,
    level: Option<u8>,
}

impl SampleGrid {
    fn no_data(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            values: vec![f32::NAN; width * height],
            level: None,
        }
    }

    /// Number of sample columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of sample rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Ordinal of the level that supplied the samples, or `None` when no
    /// data was available yet.
    #[inline]
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    /// All samples in row-major order, southernmost row first.
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The sample at `row` (0 = southernmost) and `column` (0 = westernmost).
    pub fn value(&self, row: usize, column: usize) -> f32 {
        self.values[row * self.width + column]
    }
}

/// Answers point, grid, and extrema queries over a tile pyramid, fetching
/// missing tiles in the background.
///
/// All query methods take `&mut self`: the calling thread is the single
/// consumer that merges completed fetches into the sample cache. Queries
/// never block on fetches; they return the best data cached right now and
/// grow finer on later calls as fetches land.
pub struct TiledBlockSampler {
    pyramid: TilePyramid,
    adapter: ResourceCacheAdapter<TileKey, Arc<Vec<i16>>>,
    extrema_samples: u32,
    timestamp: u64,
}

impl TiledBlockSampler {
    /// Creates a sampler over `pyramid` with tile payloads resolved and
    /// decoded by the given pair.
    pub fn new(
        pyramid: TilePyramid,
        resolver: Arc<dyn TileAddressResolver>,
        decoder: Arc<dyn TileDecoder>,
        config: SamplerConfig,
    ) -> Result<Self, SamplerError> {
        let fetcher = Arc::new(TileFetcher {
            pyramid: pyramid.clone(),
            resolver,
            decoder,
        });
        let adapter = ResourceCacheAdapter::new(
            config.cache_capacity,
            config.cache_low_water,
            config.max_retrievals,
            fetcher,
        )?;
        tracing::debug!(
            capacity_kb = config.cache_capacity / 1024,
            levels = pyramid.level_count(),
            "sample cache initialized"
        );
        Ok(Self {
            pyramid,
            adapter,
            extrema_samples: config.extrema_samples.max(1),
            timestamp: 0,
        })
    }

    /// The pyramid this sampler answers queries over.
    #[inline]
    pub fn pyramid(&self) -> &TilePyramid {
        &self.pyramid
    }

    /// A counter bumped every time cached data changes meaning, letting
    /// callers invalidate derived state.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Number of tile fetches currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.adapter.in_flight_len()
    }

    /// Total sample cache capacity in bytes.
    pub fn cache_capacity(&self) -> usize {
        self.adapter.capacity()
    }

    /// Bytes of sample data currently cached.
    pub fn cached_bytes(&self) -> usize {
        self.adapter.used_capacity()
    }

    /// Drops all cached samples, forcing future queries to fetch anew.
    ///
    /// Fetches already in flight are not cancelled; their results may merge
    /// back after the clear. The timestamp is bumped so callers can discard
    /// state derived from the old data.
    pub fn invalidate(&mut self) {
        self.adapter.clear();
        self.timestamp += 1;
        tracing::debug!(timestamp = self.timestamp, "sample cache invalidated");
    }

    /// Samples the value at a single location from the finest level with
    /// cached data, scheduling fetches for the finest level when missing.
    ///
    /// Returns `None` when the location is outside the pyramid or no data
    /// is available yet.
    pub fn query_point(&mut self, latitude: f64, longitude: f64) -> Result<Option<f32>, SamplerError> {
        if !self.pyramid.sector().contains(latitude, longitude) {
            return Ok(None);
        }
        let point = Sector::new(latitude, latitude, longitude, longitude);
        let grid = self.query_grid(&point, 1, 1)?;
        match grid.level() {
            Some(_) => Ok(Some(grid.value(0, 0))),
            None => Ok(None),
        }
    }

    /// Samples a `width` x `height` grid of values evenly spaced over
    /// `sector`, bilinearly interpolated from the best available level.
    ///
    /// The target level is chosen from the grid's latitudinal spacing; when
    /// its tile block is incomplete the query falls back level by level
    /// toward level 0, returning the first complete one. Fetches are
    /// scheduled for every missing tile at the target level and level 0.
    pub fn query_grid(
        &mut self,
        sector: &Sector,
        width: usize,
        height: usize,
    ) -> Result<SampleGrid, SamplerError> {
        if width < 1 || height < 1 {
            return Err(SamplerError::InvalidGrid { width, height });
        }
        let mut grid = SampleGrid::no_data(width, height);
        if !self.pyramid.sector().intersects(sector) {
            return Ok(grid);
        }

        let target = self.target_ordinal(sector.delta_latitude() / height as f64)?;
        for ordinal in (0..=target).rev() {
            let retrieval_enabled = ordinal == target || ordinal == 0;
            let level = match self.pyramid.level(ordinal) {
                Some(level) => *level,
                None => continue,
            };
            if let Some(block) =
                self.fetch_grid_block(&level, sector, width, height, retrieval_enabled)
            {
                read_grid(&block, sector, width, height, &mut grid.values);
                grid.level = Some(ordinal);
                return Ok(grid);
            }
        }
        Ok(grid)
    }

    /// Scans the raw minimum and maximum sample over `sector` at a level
    /// matched to the sector's size, with the same fallback behavior as
    /// [`TiledBlockSampler::query_grid`]. No interpolation is applied.
    ///
    /// Returns `None` when the sector misses the pyramid or no level has a
    /// complete tile block yet.
    pub fn query_extrema(&mut self, sector: &Sector) -> Result<Option<(f32, f32)>, SamplerError> {
        if !self.pyramid.sector().intersects(sector) {
            return Ok(None);
        }

        let target =
            self.target_ordinal(sector.delta_latitude() / self.extrema_samples as f64)?;
        for ordinal in (0..=target).rev() {
            let retrieval_enabled = ordinal == target || ordinal == 0;
            let level = match self.pyramid.level(ordinal) {
                Some(level) => *level,
                None => continue,
            };
            if let Some(block) = self.fetch_sector_block(&level, sector, retrieval_enabled) {
                return Ok(scan_extrema(&block, sector));
            }
        }
        Ok(None)
    }

    /// Level ordinal nearest the given latitudinal sample spacing, or the
    /// finest level for degenerate (zero-extent) queries.
    fn target_ordinal(&self, degrees_per_sample: f64) -> Result<u8, SamplerError> {
        if degrees_per_sample > 0.0 {
            Ok(self
                .pyramid
                .level_for_resolution(degrees_per_sample.to_radians())?
                .ordinal)
        } else {
            Ok(self.pyramid.last_level().ordinal)
        }
    }

    /// Cache lookup for one tile, scheduling a background fetch on a miss
    /// only when retrieval is enabled for the queried level.
    fn lookup_tile(
        &mut self,
        level: &Level,
        row: u32,
        column: u32,
        retrieval_enabled: bool,
    ) -> Option<Arc<Vec<i16>>> {
        let key = TileKey::new(level.ordinal, row, column);
        if retrieval_enabled {
            self.adapter.retrieve(&key).cloned()
        } else {
            self.adapter.get(&key).cloned()
        }
    }

    /// Assembles the tile block covering the bilinear footprint of a
    /// `width` x `height` grid over `sector` at `level`.
    ///
    /// Returns `None` when any needed tile is missing. All tiles are
    /// probed even after the first miss so that each missing tile gets its
    /// own background fetch.
    fn fetch_grid_block(
        &mut self,
        level: &Level,
        sector: &Sector,
        width: usize,
        height: usize,
        retrieval_enabled: bool,
    ) -> Option<TileBlock> {
        let bounds = level.sector;
        let raster_width = level.level_width as i64;
        let raster_height = level.level_height as i64;
        let s_inset = 1.0 / (2.0 * raster_width as f64);
        let t_inset = 1.0 / (2.0 * raster_height as f64);

        let mut block = TileBlock::new(*level);

        let delta_lon = if width > 1 {
            sector.delta_longitude() / (width - 1) as f64
        } else {
            0.0
        };
        for uidx in 0..width {
            // The last sample lands exactly on the sector edge.
            let lon = if uidx == width - 1 {
                sector.max_longitude()
            } else {
                sector.min_longitude() + delta_lon * uidx as f64
            };
            if lon < bounds.min_longitude() || lon > bounds.max_longitude() {
                continue;
            }
            let s = (lon - bounds.min_longitude()) / bounds.delta_longitude();
            let (i0, i1) = horizontal_texels(s, raster_width, s_inset, bounds.is_full_sphere());
            block.add_column((i0 / level.tile_width as i64) as u32);
            block.add_column((i1 / level.tile_width as i64) as u32);
        }

        let delta_lat = if height > 1 {
            sector.delta_latitude() / (height - 1) as f64
        } else {
            0.0
        };
        for vidx in 0..height {
            let lat = if vidx == height - 1 {
                sector.max_latitude()
            } else {
                sector.min_latitude() + delta_lat * vidx as f64
            };
            if lat < bounds.min_latitude() || lat > bounds.max_latitude() {
                continue;
            }
            let t = (bounds.max_latitude() - lat) / bounds.delta_latitude();
            let (j0, j1) = vertical_texels(t, raster_height, t_inset);
            block.add_row((j0 / level.tile_height as i64) as u32);
            block.add_row((j1 / level.tile_height as i64) as u32);
        }

        self.fill_block(&mut block, retrieval_enabled).then_some(block)
    }

    /// Assembles the tile block covering the intersection of `sector` with
    /// `level`'s bounds, for extrema scans.
    fn fetch_sector_block(
        &mut self,
        level: &Level,
        sector: &Sector,
        retrieval_enabled: bool,
    ) -> Option<TileBlock> {
        let intersection = level.sector.intersection(sector)?;
        let (i_min, i_max, j_min, j_max) = texel_ranges(level, &intersection);

        let mut block = TileBlock::new(*level);
        for row in (j_min / level.tile_height)..=(j_max / level.tile_height) {
            block.add_row(row);
        }
        for column in (i_min / level.tile_width)..=(i_max / level.tile_width) {
            block.add_column(column);
        }

        self.fill_block(&mut block, retrieval_enabled).then_some(block)
    }

    /// Fills `block` with cached arrays for every row/column combination,
    /// returning whether the block is complete.
    fn fill_block(&mut self, block: &mut TileBlock, retrieval_enabled: bool) -> bool {
        let level = *block.level();
        let rows: Vec<u32> = block.rows().collect();
        let columns: Vec<u32> = block.columns().collect();

        let mut complete = true;
        for &row in &rows {
            for &column in &columns {
                match self.lookup_tile(&level, row, column, retrieval_enabled) {
                    Some(array) => block.put_tile_array(row, column, array),
                    // Keep probing so every missing tile gets a fetch.
                    None => complete = false,
                }
            }
        }
        complete
    }
}

/// Horizontal texel pair bracketing normalized coordinate `s`: wrapped
/// across the antimeridian on full-sphere rasters, clamped half a texel
/// inside the edge otherwise.
fn horizontal_texels(s: f64, raster_width: i64, inset: f64, full_sphere: bool) -> (i64, i64) {
    if full_sphere {
        let u = raster_width as f64 * fract(s);
        let i0 = mod_floor((u - 0.5).floor() as i64, raster_width);
        (i0, mod_floor(i0 + 1, raster_width))
    } else {
        let u = raster_width as f64 * s.clamp(inset, 1.0 - inset);
        let i0 = ((u - 0.5).floor() as i64).clamp(0, raster_width - 1);
        (i0, (i0 + 1).clamp(0, raster_width - 1))
    }
}

/// Vertical texel pair bracketing normalized coordinate `t`, clamped half
/// a texel inside the raster edge. Latitude never wraps.
fn vertical_texels(t: f64, raster_height: i64, inset: f64) -> (i64, i64) {
    let v = raster_height as f64 * t.clamp(inset, 1.0 - inset);
    let j0 = ((v - 0.5).floor() as i64).clamp(0, raster_height - 1);
    (j0, (j0 + 1).clamp(0, raster_height - 1))
}

/// Inclusive global texel ranges covering `intersection` within `level`.
fn texel_ranges(level: &Level, intersection: &Sector) -> (u32, u32, u32, u32) {
    let bounds = level.sector;
    let raster_width = level.level_width as f64;
    let raster_height = level.level_height as f64;

    let s_min = (intersection.min_longitude() - bounds.min_longitude()) / bounds.delta_longitude();
    let s_max = (intersection.max_longitude() - bounds.min_longitude()) / bounds.delta_longitude();
    let i_min = (raster_width * s_min).floor().clamp(0.0, raster_width - 1.0) as u32;
    let i_max = (raster_width * s_max).ceil().clamp(0.0, raster_width - 1.0) as u32;

    let t_min = (bounds.max_latitude() - intersection.max_latitude()) / bounds.delta_latitude();
    let t_max = (bounds.max_latitude() - intersection.min_latitude()) / bounds.delta_latitude();
    let j_min = (raster_height * t_min).floor().clamp(0.0, raster_height - 1.0) as u32;
    let j_max = (raster_height * t_max).ceil().clamp(0.0, raster_height - 1.0) as u32;

    (i_min, i_max, j_min, j_max)
}

/// Samples a grid of values from a complete tile block by bilinear
/// interpolation. Grid points outside the level's bounds are left as-is
/// (NaN in a freshly initialized grid).
fn read_grid(block: &TileBlock, sector: &Sector, width: usize, height: usize, result: &mut [f32]) {
    let level = block.level();
    let bounds = level.sector;
    let tile_width = level.tile_width as i64;
    let tile_height = level.tile_height as i64;
    let raster_width = level.level_width as i64;
    let raster_height = level.level_height as i64;
    let s_inset = 1.0 / (2.0 * raster_width as f64);
    let t_inset = 1.0 / (2.0 * raster_height as f64);

    let delta_lat = if height > 1 {
        sector.delta_latitude() / (height - 1) as f64
    } else {
        0.0
    };
    let delta_lon = if width > 1 {
        sector.delta_longitude() / (width - 1) as f64
    } else {
        0.0
    };

    let mut ridx = 0;
    for vidx in 0..height {
        let lat = if vidx == height - 1 {
            sector.max_latitude()
        } else {
            sector.min_latitude() + delta_lat * vidx as f64
        };
        let t = (bounds.max_latitude() - lat) / bounds.delta_latitude();
        let v = raster_height as f64 * t.clamp(t_inset, 1.0 - t_inset);
        let b = fract(v - 0.5);
        let (j0, j1) = vertical_texels(t, raster_height, t_inset);
        let row0 = (j0 / tile_height) as u32;
        let row1 = (j1 / tile_height) as u32;

        for uidx in 0..width {
            let lon = if uidx == width - 1 {
                sector.max_longitude()
            } else {
                sector.min_longitude() + delta_lon * uidx as f64
            };
            let s = (lon - bounds.min_longitude()) / bounds.delta_longitude();
            let u = if bounds.is_full_sphere() {
                raster_width as f64 * fract(s)
            } else {
                raster_width as f64 * s.clamp(s_inset, 1.0 - s_inset)
            };
            let a = fract(u - 0.5);
            let (i0, i1) = horizontal_texels(s, raster_width, s_inset, bounds.is_full_sphere());
            let col0 = (i0 / tile_width) as u32;
            let col1 = (i1 / tile_width) as u32;

            if bounds.contains(lat, lon) {
                let s00 = block.read_texel(row0, col0, (i0 % tile_width) as u32, (j0 % tile_height) as u32);
                let s10 = block.read_texel(row0, col1, (i1 % tile_width) as u32, (j0 % tile_height) as u32);
                let s01 = block.read_texel(row1, col0, (i0 % tile_width) as u32, (j1 % tile_height) as u32);
                let s11 = block.read_texel(row1, col1, (i1 % tile_width) as u32, (j1 % tile_height) as u32);
                result[ridx] = ((1.0 - a) * (1.0 - b) * s00
                    + a * (1.0 - b) * s10
                    + (1.0 - a) * b * s01
                    + a * b * s11) as f32;
            }
            ridx += 1;
        }
    }
}

/// Scans the raw minimum and maximum sample over the part of `block`
/// intersecting `sector`. Returns `None` when nothing was scanned.
fn scan_extrema(block: &TileBlock, sector: &Sector) -> Option<(f32, f32)> {
    let level = block.level();
    let tile_width = level.tile_width;
    let tile_height = level.tile_height;
    let intersection = level.sector.intersection(sector)?;
    let (i_min, i_max, j_min, j_max) = texel_ranges(level, &intersection);

    let mut minimum = f32::MAX;
    let mut maximum = f32::MIN;
    for row in block.rows() {
        let row_j_min = row * tile_height;
        let row_j_max = row_j_min + tile_height - 1;
        let j0 = j_min.clamp(row_j_min, row_j_max) % tile_height;
        let j1 = j_max.clamp(row_j_min, row_j_max) % tile_height;
        for column in block.columns() {
            let col_i_min = column * tile_width;
            let col_i_max = col_i_min + tile_width - 1;
            let i0 = i_min.clamp(col_i_min, col_i_max) % tile_width;
            let i1 = i_max.clamp(col_i_min, col_i_max) % tile_width;
            let array = match block.tile_array(row, column) {
                Some(array) => array,
                None => continue,
            };

            for j in j0..=j1 {
                for i in i0..=i1 {
                    let sample = array[(i + j * tile_width) as usize] as f32;
                    minimum = minimum.min(sample);
                    maximum = maximum.max(sample);
                }
            }
        }
    }

    (minimum <= maximum).then_some((minimum, maximum))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 4-column by 2-row level 0 of 4x4 tiles: 16x8 raster over the
    /// full sphere, 22.5 degrees per texel both ways.
    fn full_sphere_level() -> Level {
        *TilePyramid::new(Sector::full_sphere(), 90.0, 4, 4, 1)
            .unwrap()
            .level(0)
            .unwrap()
    }

    /// Tile array whose texel at local (i, j) holds a value unique across
    /// the whole level raster.
    fn tile_array(level: &Level, row: u32, column: u32) -> Arc<Vec<i16>> {
        let mut values = Vec::with_capacity((level.tile_width * level.tile_height) as usize);
        for j in 0..level.tile_height {
            for i in 0..level.tile_width {
                let global_i = column * level.tile_width + i;
                let global_j = row * level.tile_height + j;
                values.push((global_j * level.level_width + global_i) as i16);
            }
        }
        Arc::new(values)
    }

    fn full_block(level: Level) -> TileBlock {
        let mut block = TileBlock::new(level);
        for row in 0..level.num_rows() {
            block.add_row(row);
            for column in 0..level.num_columns() {
                block.add_column(column);
                block.put_tile_array(row, column, tile_array(&level, row, column));
            }
        }
        block
    }

    fn sample_one(block: &TileBlock, latitude: f64, longitude: f64) -> f32 {
        let point = Sector::new(latitude, latitude, longitude, longitude);
        let mut result = [f32::NAN];
        read_grid(block, &point, 1, 1, &mut result);
        result[0]
    }

    #[test]
    fn bilinear_is_exact_at_texel_centers() {
        let level = full_sphere_level();
        let block = full_block(level);
        let texel = 22.5;

        for (global_i, global_j) in [(0u32, 0u32), (5, 3), (15, 7), (8, 4)] {
            let longitude = -180.0 + texel * (global_i as f64 + 0.5);
            let latitude = 90.0 - texel * (global_j as f64 + 0.5);
            let expected = (global_j * level.level_width + global_i) as f32;
            assert_eq!(sample_one(&block, latitude, longitude), expected);
        }
    }

    #[test]
    fn bilinear_averages_between_texel_centers() {
        let level = full_sphere_level();
        let block = full_block(level);

        // Halfway between the centers of texels (0, 0) and (1, 0): the
        // expected value is their mean.
        let longitude = -180.0 + 22.5;
        let latitude = 90.0 - 11.25;
        let expected = (0.0 + 1.0) / 2.0;
        assert_eq!(sample_one(&block, latitude, longitude), expected);
    }

    #[test]
    fn horizontal_sampling_wraps_across_the_antimeridian() {
        let level = full_sphere_level();
        let block = full_block(level);

        // At exactly -180 degrees the left neighbor is the raster's last
        // column; the sample is the mean of texels 15 and 0 in that row.
        let latitude = 90.0 - 11.25;
        let expected = (15.0 + 0.0) / 2.0;
        assert_eq!(sample_one(&block, latitude, -180.0), expected);
        assert_eq!(sample_one(&block, latitude, 180.0), expected);
    }

    #[test]
    fn vertical_sampling_clamps_at_the_poles() {
        let level = full_sphere_level();
        let block = full_block(level);

        // At the pole the vertical coordinate clamps half a texel inside
        // the raster, so the sample reads row 0 exactly.
        let longitude = -180.0 + 22.5 * 0.5;
        assert_eq!(sample_one(&block, 90.0, longitude), 0.0);
    }

    #[test]
    fn partial_pyramid_clamps_horizontal_edges() {
        let level = *TilePyramid::new(Sector::new(0.0, 45.0, 0.0, 90.0), 45.0, 4, 4, 1)
            .unwrap()
            .level(0)
            .unwrap();
        assert!(!level.sector.is_full_sphere());
        let block = full_block(level);

        // At the western edge the horizontal coordinate clamps half a
        // texel inside the raster: the sample equals the edge texel, with
        // no wrap to the eastern side.
        let texel_lat = 45.0 / 4.0;
        let latitude = 45.0 - texel_lat * 0.5;
        assert_eq!(sample_one(&block, latitude, 0.0), 0.0);
    }

    #[test]
    fn scan_extrema_finds_min_and_max() {
        let level = full_sphere_level();
        let block = full_block(level);

        let all = scan_extrema(&block, &Sector::full_sphere()).unwrap();
        assert_eq!(all, (0.0, 127.0));

        // A sector covering only the northwest tile.
        let northwest = scan_extrema(&block, &Sector::new(0.0, 90.0, -180.0, -90.0)).unwrap();
        assert_eq!(northwest.0, 0.0);
    }

    #[test]
    fn decode_errors_convert_to_retrieve_failures() {
        let error: RetrieveError = DecodeError::UnexpectedLength {
            expected: 16,
            actual: 12,
        }
        .into();
        assert_eq!(
            error,
            RetrieveError::Failed("tile payload has 12 samples, expected 16".to_string())
        );
    }

    #[test]
    fn decode_length_check_handles_tiles_larger_than_u32_texels() {
        // A 65536x65536 tile holds 2^32 texels; the expected-length check
        // must not wrap to zero and accept an empty payload.
        let pyramid = TilePyramid::new(Sector::full_sphere(), 90.0, 65536, 65536, 1).unwrap();
        let resolver: Arc<dyn TileAddressResolver> = Arc::new(
            |level: &Level, row: u32, column: u32| format!("L{}/{}/{}", level.ordinal, row, column),
        );
        let decoder: Arc<dyn TileDecoder> = Arc::new(|_: &str, _: u32, _: u32| {
            Ok::<Arc<Vec<i16>>, DecodeError>(Arc::new(Vec::new()))
        });
        let fetcher = TileFetcher {
            pyramid,
            resolver,
            decoder,
        };

        let error = fetcher.fetch(&TileKey::new(0, 0, 0)).unwrap_err();
        assert_eq!(
            error,
            RetrieveError::Failed(
                "tile payload has 0 samples, expected 4294967296".to_string()
            )
        );
    }

    #[test]
    fn closures_satisfy_the_resolver_and_decoder_traits() {
        let resolver: Arc<dyn TileAddressResolver> = Arc::new(
            |level: &Level, row: u32, column: u32| format!("L{}/{}/{}", level.ordinal, row, column),
        );
        let level = full_sphere_level();
        assert_eq!(resolver.resolve(&level, 1, 2), "L0/1/2");

        let decoder: Arc<dyn TileDecoder> =
            Arc::new(|_address: &str, width: u32, height: u32| {
                Ok::<_, DecodeError>(Arc::new(vec![0i16; (width * height) as usize]))
            });
        assert_eq!(decoder.decode("x", 2, 2).unwrap().len(), 4);
    }
}
