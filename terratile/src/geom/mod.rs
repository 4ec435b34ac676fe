//! Geographic geometry primitives
//!
//! Provides the [`Sector`] bounding rectangle used for pyramid extents and
//! query regions, plus the fractional/modular arithmetic helpers used by the
//! tile block assembly and bilinear sampling math.

mod sector;

pub use sector::Sector;

/// Returns the fractional part of `value`, always in `[0, 1)`.
///
/// Unlike `f64::fract`, the result is non-negative for negative inputs,
/// which is what texture-style coordinate wrapping requires:
/// `fract(-0.25) == 0.75`.
#[inline]
pub fn fract(value: f64) -> f64 {
    value - value.floor()
}

/// Floored modulo: the remainder of `value / modulus` with the sign of the
/// modulus.
///
/// Used to wrap horizontal texel indices on full-sphere rasters, where a
/// coordinate one texel past the east edge must land on the west edge.
#[inline]
pub fn mod_floor(value: i64, modulus: i64) -> i64 {
    ((value % modulus) + modulus) % modulus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fract_of_positive_value() {
        assert_eq!(fract(2.25), 0.25);
        assert_eq!(fract(0.5), 0.5);
    }

    #[test]
    fn fract_of_negative_value_is_nonnegative() {
        assert_eq!(fract(-0.25), 0.75);
        assert_eq!(fract(-2.0), 0.0);
    }

    #[test]
    fn fract_of_whole_number_is_zero() {
        assert_eq!(fract(3.0), 0.0);
        assert_eq!(fract(0.0), 0.0);
    }

    #[test]
    fn mod_floor_wraps_negative_values() {
        assert_eq!(mod_floor(-1, 8), 7);
        assert_eq!(mod_floor(-8, 8), 0);
        assert_eq!(mod_floor(-9, 8), 7);
    }

    #[test]
    fn mod_floor_passes_through_in_range_values() {
        assert_eq!(mod_floor(0, 8), 0);
        assert_eq!(mod_floor(7, 8), 7);
        assert_eq!(mod_floor(8, 8), 0);
    }
}
