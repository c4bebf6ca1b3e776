use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{coordinate::Coordinate, geometry::path_distance_km};

/// The trip currently being recorded.
///
/// The path always starts with `start_coords` and only ever grows at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTrip {
    pub id: i64,
    pub origin: String,
    pub start_time: DateTime<Utc>,
    pub start_coords: Coordinate,
    pub path: Vec<Coordinate>,
}

impl ActiveTrip {
    pub fn new(id: i64, origin: String, start_time: DateTime<Utc>, start_coords: Coordinate) -> Self {
        Self {
            id,
            origin,
            start_time,
            start_coords,
            path: vec![start_coords],
        }
    }

    pub fn append(&mut self, coordinate: Coordinate) {
        self.path.push(coordinate);
    }

    pub fn last_position(&self) -> Coordinate {
        self.path.last().copied().unwrap_or(self.start_coords)
    }

    pub fn distance_so_far_km(&self) -> f64 {
        path_distance_km(&self.path)
    }

    /// False for stored trips that can not be resumed, e.g. an empty path.
    pub fn is_well_formed(&self) -> bool {
        !self.path.is_empty()
    }
}

#[test]
fn new_trip_path_holds_only_the_start() {
    let start = Coordinate::new(56.15, 10.2);
    let trip = ActiveTrip::new(1, "Aarhus".into(), Utc::now(), start);
    assert_eq!(trip.path, vec![start]);
    assert_eq!(trip.last_position(), start);
    assert_eq!(trip.distance_so_far_km(), 0.);
}

#[test]
fn samples_are_kept_in_delivery_order() {
    let start = Coordinate::new(0., 0.);
    let mut trip = ActiveTrip::new(1, "Origin".into(), Utc::now(), start);
    let samples: Vec<Coordinate> = (1..=5).map(|i| Coordinate::new(0., i as f64 * 0.01)).collect();
    for sample in &samples {
        trip.append(*sample);
    }

    assert_eq!(trip.path.len(), 1 + samples.len());
    assert_eq!(trip.path[0], start);
    assert_eq!(&trip.path[1..], samples.as_slice());
    assert_eq!(trip.last_position(), samples[4]);
}

#[test]
fn serializes_with_camel_case_keys() {
    let trip = ActiveTrip::new(7, "Home".into(), Utc::now(), Coordinate::new(1., 2.));
    let json = serde_json::to_value(&trip).unwrap();
    assert!(json.get("startTime").is_some());
    assert!(json.get("startCoords").is_some());
    assert_eq!(json["path"][0]["lat"], 1.);
}
