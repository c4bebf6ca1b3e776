use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    active_trip::ActiveTrip,
    coordinate::Coordinate,
    geometry::path_distance_km,
    trip::{TransportMode, Trip},
};

/// The destination the user confirmed at the end of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedDestination {
    pub coords: Coordinate,
    pub name: String,
}

/// Turns the recorded trip and the user's answers into a completed trip.
///
/// The destination is appended to a copy of the path exactly once and the
/// distance is measured along that final path. `active` is left untouched.
pub fn finalize_trip(
    active: &ActiveTrip,
    destination: &ConfirmedDestination,
    mode: TransportMode,
    companions: u32,
    end_time: DateTime<Utc>,
) -> Trip {
    let mut path = Vec::with_capacity(active.path.len() + 1);
    path.extend_from_slice(&active.path);
    path.push(destination.coords);

    Trip {
        id: active.id,
        origin: active.origin.clone(),
        destination: destination.name.clone(),
        start_time: active.start_time,
        end_time,
        start_coords: active.start_coords,
        end_coords: destination.coords,
        mode,
        companions,
        distance: path_distance_km(&path),
        path,
    }
}

#[test]
fn destination_is_appended_once_and_distance_covers_it() {
    use crate::geometry::distance_km;

    let a = Coordinate::new(0., 0.);
    let b = Coordinate::new(0., 1.);
    let c = Coordinate::new(0., 2.);

    let mut active = ActiveTrip::new(42, "Start".into(), Utc::now(), a);
    active.append(b);
    let before = active.clone();

    let destination = ConfirmedDestination {
        coords: c,
        name: "End".into(),
    };
    let trip = finalize_trip(&active, &destination, TransportMode::Walk, 1, Utc::now());

    assert_eq!(active, before);
    assert_eq!(trip.path, vec![a, b, c]);
    assert_eq!(trip.end_coords, c);
    assert_eq!(trip.start_coords, a);
    assert_eq!(trip.distance, distance_km(a, b) + distance_km(b, c));
    assert_eq!(trip.destination, "End");
    assert_eq!(trip.origin, "Start");
    assert_eq!(trip.id, 42);
    assert_eq!(trip.companions, 1);
}
