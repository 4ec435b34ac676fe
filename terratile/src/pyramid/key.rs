//! Packed tile addressing key

use std::fmt;

/// Number of bits used for the row and column components.
const INDEX_BITS: u32 = 28;

/// Maximum row or column index representable in a [`TileKey`].
pub const MAX_TILE_INDEX: u32 = (1 << INDEX_BITS) - 1;

/// A tile address packed into 64 bits: `level(8) | row(28) | column(28)`.
///
/// The key is unique per `(level, row, column)` triple within the bit
/// widths and serves both as the sample cache key and as the in-flight
/// deduplication key for background retrievals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey(u64);

impl TileKey {
    /// Packs a level ordinal and tile row/column into a key.
    ///
    /// Row and column values are masked to 28 bits; callers are expected to
    /// stay within [`MAX_TILE_INDEX`], which pyramid construction enforces.
    #[inline]
    pub fn new(level: u8, row: u32, column: u32) -> Self {
        debug_assert!(row <= MAX_TILE_INDEX && column <= MAX_TILE_INDEX);
        let packed = ((level as u64) << (2 * INDEX_BITS))
            | (((row & MAX_TILE_INDEX) as u64) << INDEX_BITS)
            | ((column & MAX_TILE_INDEX) as u64);
        Self(packed)
    }

    /// The level ordinal component.
    #[inline]
    pub fn level(self) -> u8 {
        (self.0 >> (2 * INDEX_BITS)) as u8
    }

    /// The tile row component.
    #[inline]
    pub fn row(self) -> u32 {
        ((self.0 >> INDEX_BITS) as u32) & MAX_TILE_INDEX
    }

    /// The tile column component.
    #[inline]
    pub fn column(self) -> u32 {
        (self.0 as u32) & MAX_TILE_INDEX
    }
}

impl From<TileKey> for u64 {
    fn from(key: TileKey) -> u64 {
        key.0
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}/{}", self.level(), self.row(), self.column())
    }
}
