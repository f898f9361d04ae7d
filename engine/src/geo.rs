//! Geographic helpers: coordinates, great-circle distances and bounding boxes.

use std::f64::consts::PI;

/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Fixed point scale of coordinates on disk.
pub const MICRO_DEGREES: f64 = 1_000_000.0;

/// A point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Coordinate { lon, lat }
    }

    pub fn from_micro_degrees(lon: i64, lat: i64) -> Self {
        Coordinate {
            lon: lon as f64 / MICRO_DEGREES,
            lat: lat as f64 / MICRO_DEGREES,
        }
    }

    pub fn to_micro_degrees(self) -> (i64, i64) {
        ((self.lon * MICRO_DEGREES).round() as i64, (self.lat * MICRO_DEGREES).round() as i64)
    }

    /// Great-circle distance in meters.
    pub fn distance_to(self, other: Coordinate) -> f64 {
        let p = PI / 180.0;
        let a = 0.5 - ((other.lat - self.lat) * p).cos() / 2.0
            + (self.lat * p).cos() * (other.lat * p).cos() * (1.0 - ((other.lon - self.lon) * p).cos()) / 2.0;
        2.0 * EARTH_RADIUS * a.max(0.0).sqrt().min(1.0).asin()
    }
}

/// Axis aligned box around a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        }
    }
}

impl BoundingBox {
    pub fn extend(&mut self, coord: Coordinate) {
        self.min_lon = self.min_lon.min(coord.lon);
        self.max_lon = self.max_lon.max(coord.lon);
        self.min_lat = self.min_lat.min(coord.lat);
        self.max_lat = self.max_lat.max(coord.lat);
    }

    pub fn is_empty(&self) -> bool {
        self.min_lon > self.max_lon
    }
}

impl FromIterator<Coordinate> for BoundingBox {
    fn from_iter<I: IntoIterator<Item = Coordinate>>(iter: I) -> Self {
        let mut bounds = BoundingBox::default();
        for coord in iter {
            bounds.extend(coord);
        }
        bounds
    }
}

/// Approximate diameter of a point set in meters.
///
/// Takes the westernmost, easternmost, southernmost and northernmost points
/// and returns the largest pairwise distance among them.
pub fn extreme_point_diameter(coords: &[Coordinate]) -> f64 {
    let first = match coords.first() {
        Some(&first) => first,
        None => return 0.0,
    };
    let mut extremes = [first; 4];
    for &coord in &coords[1..] {
        if coord.lon < extremes[0].lon {
            extremes[0] = coord;
        }
        if coord.lon > extremes[1].lon {
            extremes[1] = coord;
        }
        if coord.lat < extremes[2].lat {
            extremes[2] = coord;
        }
        if coord.lat > extremes[3].lat {
            extremes[3] = coord;
        }
    }

    let mut diameter: f64 = 0.0;
    for i in 0..4 {
        for j in i + 1..4 {
            diameter = diameter.max(extremes[i].distance_to(extremes[j]));
        }
    }
    diameter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_of_identical_points_is_zero() {
        let c = Coordinate::new(113.25, 23.1);
        assert!(c.distance_to(c).abs() < 1e-6);
    }

    #[test]
    fn one_degree_latitude() {
        let d = Coordinate::new(0.0, 0.0).distance_to(Coordinate::new(0.0, 1.0));
        assert!((d - 111_194.9).abs() < 1.0, "{}", d);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinate::new(113.2644, 23.1291);
        let b = Coordinate::new(114.0579, 22.5431);
        assert!((a.distance_to(b) - b.distance_to(a)).abs() < 1e-6);
    }

    #[test]
    fn micro_degrees_survive_a_round_trip() {
        for &(lon, lat) in &[(116_400_000, 39_900_000), (-73_985_656, 40_748_433), (0, -1)] {
            assert_eq!(Coordinate::from_micro_degrees(lon, lat).to_micro_degrees(), (lon, lat));
        }
    }

    #[test]
    fn diameter_of_a_line() {
        let coords: Vec<_> = (0..5).map(|i| Coordinate::new(0.0, f64::from(i))).collect();
        let expected = coords[0].distance_to(coords[4]);
        assert!((extreme_point_diameter(&coords) - expected).abs() < 1e-6);
    }

    #[test]
    fn bounding_box_from_points() {
        let bounds: BoundingBox = vec![Coordinate::new(1.0, 5.0), Coordinate::new(-2.0, 7.0)].into_iter().collect();
        assert_eq!(bounds.min_lon, -2.0);
        assert_eq!(bounds.max_lon, 1.0);
        assert_eq!(bounds.min_lat, 5.0);
        assert_eq!(bounds.max_lat, 7.0);
        assert!(BoundingBox::default().is_empty());
    }
}
