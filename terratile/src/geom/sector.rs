//! Geographic bounding rectangle

/// A geographic bounding rectangle in degrees.
///
/// Latitudes increase northward, longitudes eastward. A sector may be
/// degenerate (zero width or height), which is how single points are
/// expressed for point queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    min_latitude: f64,
    max_latitude: f64,
    min_longitude: f64,
    max_longitude: f64,
}

impl Sector {
    /// Creates a sector from its latitude and longitude bounds in degrees.
    pub fn new(min_latitude: f64, max_latitude: f64, min_longitude: f64, max_longitude: f64) -> Self {
        Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    /// The sector covering the whole globe.
    pub fn full_sphere() -> Self {
        Self::new(-90.0, 90.0, -180.0, 180.0)
    }

    /// Minimum latitude in degrees.
    #[inline]
    pub fn min_latitude(&self) -> f64 {
        self.min_latitude
    }

    /// Maximum latitude in degrees.
    #[inline]
    pub fn max_latitude(&self) -> f64 {
        self.max_latitude
    }

    /// Minimum longitude in degrees.
    #[inline]
    pub fn min_longitude(&self) -> f64 {
        self.min_longitude
    }

    /// Maximum longitude in degrees.
    #[inline]
    pub fn max_longitude(&self) -> f64 {
        self.max_longitude
    }

    /// Latitudinal extent in degrees.
    #[inline]
    pub fn delta_latitude(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    /// Longitudinal extent in degrees.
    #[inline]
    pub fn delta_longitude(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    /// Whether this sector spans the full longitudinal range, in which case
    /// horizontal sampling wraps around instead of clamping at the edges.
    #[inline]
    pub fn is_full_sphere(&self) -> bool {
        self.delta_longitude() >= 360.0
    }

    /// Whether the given location lies within this sector (inclusive).
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    /// Whether this sector and `other` overlap or touch.
    pub fn intersects(&self, other: &Sector) -> bool {
        other.min_latitude <= self.max_latitude
            && other.max_latitude >= self.min_latitude
            && other.min_longitude <= self.max_longitude
            && other.max_longitude >= self.min_longitude
    }

    /// Returns the overlap of this sector and `other`, or `None` when the
    /// two are disjoint. The result may be degenerate when the sectors only
    /// touch along an edge or corner.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        let min_latitude = self.min_latitude.max(other.min_latitude);
        let max_latitude = self.max_latitude.min(other.max_latitude);
        let min_longitude = self.min_longitude.max(other.min_longitude);
        let max_longitude = self.max_longitude.min(other.max_longitude);

        if min_latitude <= max_latitude && min_longitude <= max_longitude {
            Some(Sector::new(min_latitude, max_latitude, min_longitude, max_longitude))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sphere_bounds() {
        let sector = Sector::full_sphere();
        assert_eq!(sector.delta_latitude(), 180.0);
        assert_eq!(sector.delta_longitude(), 360.0);
        assert!(sector.is_full_sphere());
    }

    #[test]
    fn partial_sector_is_not_full_sphere() {
        let sector = Sector::new(-90.0, 90.0, -180.0, 179.0);
        assert!(!sector.is_full_sphere());
    }

    #[test]
    fn contains_is_inclusive_at_edges() {
        let sector = Sector::new(10.0, 20.0, 30.0, 40.0);
        assert!(sector.contains(10.0, 30.0));
        assert!(sector.contains(20.0, 40.0));
        assert!(sector.contains(15.0, 35.0));
        assert!(!sector.contains(9.99, 35.0));
        assert!(!sector.contains(15.0, 40.01));
    }

    #[test]
    fn intersects_detects_overlap_and_touch() {
        let a = Sector::new(0.0, 10.0, 0.0, 10.0);
        let b = Sector::new(5.0, 15.0, 5.0, 15.0);
        let touching = Sector::new(10.0, 20.0, 10.0, 20.0);
        let disjoint = Sector::new(11.0, 20.0, 11.0, 20.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&disjoint));
    }

    #[test]
    fn intersects_accepts_degenerate_point_sector() {
        let a = Sector::new(0.0, 10.0, 0.0, 10.0);
        let point = Sector::new(5.0, 5.0, 5.0, 5.0);
        assert!(a.intersects(&point));
        assert!(point.intersects(&a));
    }

    #[test]
    fn intersection_clips_to_overlap() {
        let a = Sector::new(0.0, 10.0, 0.0, 10.0);
        let b = Sector::new(5.0, 15.0, -5.0, 5.0);
        let clipped = a.intersection(&b).unwrap();
        assert_eq!(clipped, Sector::new(5.0, 10.0, 0.0, 5.0));
    }

    #[test]
    fn intersection_of_disjoint_sectors_is_none() {
        let a = Sector::new(0.0, 10.0, 0.0, 10.0);
        let b = Sector::new(20.0, 30.0, 20.0, 30.0);
        assert!(a.intersection(&b).is_none());
    }
}
