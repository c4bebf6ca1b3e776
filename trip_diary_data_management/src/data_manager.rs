use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use trip_diary_lib::{active_trip::ActiveTrip, coordinate::Coordinate, trip::Trip};

use crate::{
    ACTIVE_TRIP_KEY, CONSENT_KEY, DataManagerError, FileStore, KeyValueStore, TRIPS_KEY, schema,
};

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub consent: bool,
    /// Newest first
    pub trips: Vec<Trip>,
    pub active_trip: Option<ActiveTrip>,
}

/// The public interface for all trip diary persistence.
pub struct DataManager {
    store: Box<dyn KeyValueStore>,
}

impl DataManager {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn open(dir: &Path) -> Result<Self, DataManagerError> {
        Ok(Self::new(FileStore::open(dir)?))
    }

    /// Reads the stored state. Missing or unreadable entries fall back to
    /// their defaults, so this never fails.
    pub fn load(&self) -> PersistedState {
        let consent = self.load_entry::<bool>(CONSENT_KEY).unwrap_or(false);
        let trips = self.load_entry::<Vec<Trip>>(TRIPS_KEY).unwrap_or_default();
        let active_trip = self
            .load_entry::<ActiveTrip>(ACTIVE_TRIP_KEY)
            .filter(|trip| {
                if !trip.is_well_formed() {
                    tracing::warn!("Discarding stored active trip {} with an empty path", trip.id);
                }
                trip.is_well_formed()
            });

        tracing::debug!(
            "Loaded state: consent={}, {} trips, active trip: {}",
            consent,
            trips.len(),
            active_trip.as_ref().map(|trip| trip.id.to_string()).unwrap_or_else(|| "none".into())
        );

        PersistedState {
            consent,
            trips,
            active_trip,
        }
    }

    /// Writes all three entries. Without an active trip its entry is removed.
    ///
    /// A state holding NaN or infinite coordinates is rejected before
    /// anything is written, since those would come back as unreadable JSON.
    pub fn save(&mut self, state: &PersistedState) -> Result<(), DataManagerError> {
        if !state.trips.iter().all(trip_is_finite) {
            return Err(DataManagerError::NonFinite { key: TRIPS_KEY });
        }
        if state.active_trip.as_ref().is_some_and(|trip| !active_trip_is_finite(trip)) {
            return Err(DataManagerError::NonFinite { key: ACTIVE_TRIP_KEY });
        }

        self.save_entry(CONSENT_KEY, &state.consent)?;
        self.save_entry(TRIPS_KEY, &state.trips)?;
        match &state.active_trip {
            Some(active_trip) => self.save_entry(ACTIVE_TRIP_KEY, active_trip),
            None => self.store.remove(ACTIVE_TRIP_KEY),
        }
    }

    fn load_entry<T: DeserializeOwned>(&self, key: &'static str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("Failed to read {}: {}", key, err);
                return None;
            }
        };

        schema::decode(&raw)
            .map_err(|err| tracing::warn!("Discarding unreadable {}: {}", key, err))
            .ok()
    }

    fn save_entry<T: Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), DataManagerError> {
        let raw = schema::encode(value).map_err(|source| DataManagerError::Encode { key, source })?;
        self.store.set(key, &raw)
    }
}

fn trip_is_finite(trip: &Trip) -> bool {
    trip.distance.is_finite()
        && trip.start_coords.is_finite()
        && trip.end_coords.is_finite()
        && trip.path.iter().all(Coordinate::is_finite)
}

fn active_trip_is_finite(trip: &ActiveTrip) -> bool {
    trip.start_coords.is_finite() && trip.path.iter().all(Coordinate::is_finite)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use trip_diary_lib::{
        finalizer::{ConfirmedDestination, finalize_trip},
        trip::TransportMode,
    };

    use super::*;
    use crate::MemoryStore;

    fn sample_trip(id: i64) -> Trip {
        let mut active = ActiveTrip::new(id, "Home".into(), Utc::now(), Coordinate::new(0., 0.));
        active.append(Coordinate::new(0., 0.01));
        let destination = ConfirmedDestination {
            coords: Coordinate::new(0., 0.02),
            name: "Work".into(),
        };
        finalize_trip(&active, &destination, TransportMode::Cycle, 0, Utc::now())
    }

    #[test]
    fn empty_store_loads_defaults() {
        let data_manager = DataManager::new(MemoryStore::new());
        assert_eq!(data_manager.load(), PersistedState::default());
    }

    #[test]
    fn consent_survives_a_fresh_instance() {
        let store = MemoryStore::new();
        let mut data_manager = DataManager::new(store.clone());
        data_manager
            .save(&PersistedState {
                consent: true,
                ..Default::default()
            })
            .unwrap();

        let state = DataManager::new(store.clone()).load();
        assert!(state.consent);
        assert!(state.active_trip.is_none());
        assert!(!store.contains(ACTIVE_TRIP_KEY));
    }

    #[test]
    fn clearing_the_active_trip_removes_its_key() {
        let store = MemoryStore::new();
        let mut data_manager = DataManager::new(store.clone());
        let mut state = PersistedState {
            consent: true,
            trips: Vec::new(),
            active_trip: Some(ActiveTrip::new(1, "Home".into(), Utc::now(), Coordinate::new(1., 1.))),
        };

        data_manager.save(&state).unwrap();
        assert!(store.contains(ACTIVE_TRIP_KEY));
        assert_eq!(data_manager.load(), state);

        state.active_trip = None;
        data_manager.save(&state).unwrap();
        assert!(!store.contains(ACTIVE_TRIP_KEY));
        assert_eq!(data_manager.load().active_trip, None);
    }

    #[test]
    fn saving_twice_is_idempotent() {
        let store = MemoryStore::new();
        let mut data_manager = DataManager::new(store.clone());
        let state = PersistedState {
            consent: true,
            trips: vec![sample_trip(2), sample_trip(1)],
            active_trip: None,
        };

        data_manager.save(&state).unwrap();
        let first = store.get(TRIPS_KEY).unwrap();
        data_manager.save(&state).unwrap();
        assert_eq!(store.get(TRIPS_KEY).unwrap(), first);
        assert_eq!(data_manager.load(), state);
    }

    #[test]
    fn malformed_history_loads_as_empty() {
        let mut store = MemoryStore::new();
        store.set(CONSENT_KEY, "true").unwrap();
        store.set(TRIPS_KEY, "[{\"id\": \"not a trip\"").unwrap();
        store.set(ACTIVE_TRIP_KEY, "42").unwrap();

        let state = DataManager::new(store).load();
        assert!(state.consent);
        assert!(state.trips.is_empty());
        assert!(state.active_trip.is_none());
    }

    #[test]
    fn legacy_unversioned_values_are_read() {
        let mut store = MemoryStore::new();
        let trip = sample_trip(5);
        store.set(CONSENT_KEY, "true").unwrap();
        store.set(TRIPS_KEY, &serde_json::to_string(&vec![trip.clone()]).unwrap()).unwrap();

        let state = DataManager::new(store).load();
        assert!(state.consent);
        assert_eq!(state.trips, vec![trip]);
    }

    #[test]
    fn active_trip_with_empty_path_is_discarded() {
        let mut store = MemoryStore::new();
        let mut active = ActiveTrip::new(3, "Home".into(), Utc::now(), Coordinate::new(1., 1.));
        active.path.clear();
        store.set(ACTIVE_TRIP_KEY, &schema::encode(&active).unwrap()).unwrap();

        assert!(DataManager::new(store).load().active_trip.is_none());
    }

    #[test]
    fn non_finite_coordinates_never_replace_stored_history() {
        let store = MemoryStore::new();
        let mut data_manager = DataManager::new(store.clone());
        let saved = PersistedState {
            consent: true,
            trips: vec![sample_trip(1)],
            active_trip: None,
        };
        data_manager.save(&saved).unwrap();

        let mut broken = sample_trip(2);
        broken.end_coords = Coordinate::new(f64::NAN, 0.);
        broken.path.push(broken.end_coords);
        let mut state = saved.clone();
        state.trips.insert(0, broken);
        assert!(matches!(
            data_manager.save(&state),
            Err(DataManagerError::NonFinite { key: TRIPS_KEY })
        ));

        let mut active = ActiveTrip::new(3, "Home".into(), Utc::now(), Coordinate::new(1., 1.));
        active.append(Coordinate::new(0., f64::INFINITY));
        let state = PersistedState {
            active_trip: Some(active),
            ..saved.clone()
        };
        assert!(matches!(
            data_manager.save(&state),
            Err(DataManagerError::NonFinite { key: ACTIVE_TRIP_KEY })
        ));

        assert_eq!(DataManager::new(store).load(), saved);
    }
}
