use std::fmt;

use geo_types::Point;
use serde::{Deserialize, Serialize};

/// A position in degrees. Values are not range checked, only
/// [`Coordinate::is_finite`] is enforced where positions enter a trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// NaN and infinities can not be stored, JSON has no encoding for them.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Name used whenever a place name can not be looked up.
    pub fn fallback_name(&self) -> String {
        format!("Location near ({:.4}, {:.4})", self.lat, self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

// geo-types uses x = longitude, y = latitude
impl From<Point> for Coordinate {
    fn from(point: Point) -> Self {
        Self {
            lat: point.y(),
            lon: point.x(),
        }
    }
}

impl From<Coordinate> for Point {
    fn from(coordinate: Coordinate) -> Self {
        Point::new(coordinate.lon, coordinate.lat)
    }
}

#[test]
fn fallback_name_rounds_to_four_places() {
    let coordinate = Coordinate::new(55.676098, 12.568337);
    assert_eq!(coordinate.fallback_name(), "Location near (55.6761, 12.5683)");

    let negative = Coordinate::new(-33.8688, -151.20931);
    assert_eq!(negative.fallback_name(), "Location near (-33.8688, -151.2093)");
}

#[test]
fn point_conversion_swaps_axes() {
    let coordinate = Coordinate::new(56.15, 10.2);
    let point: Point = coordinate.into();
    assert_eq!(point.x(), 10.2);
    assert_eq!(point.y(), 56.15);
    assert_eq!(Coordinate::from(point), coordinate);
}

#[test]
fn non_finite_components_are_detected() {
    assert!(Coordinate::new(-33.86, 151.2).is_finite());
    assert!(!Coordinate::new(f64::NAN, 0.).is_finite());
    assert!(!Coordinate::new(0., f64::INFINITY).is_finite());
    assert!(!Coordinate::new("1e400".parse().unwrap(), 0.).is_finite());
}
