use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use trip_diary_data_management::{DataManager, DataManagerError, PersistedState};
use trip_diary_lib::{
    active_trip::ActiveTrip,
    coordinate::Coordinate,
    finalizer::{ConfirmedDestination, finalize_trip},
    trip::{TransportMode, Trip},
};

use crate::{
    map_view::MapFrame,
    position::{PositionError, PositionResult},
};

pub const DEFAULT_LOOKUP_DEBOUNCE: Duration = Duration::from_millis(500);
pub const LOCATING_STATUS: &str = "Getting your current location...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    Idle,
    TripActive,
    ConfirmingDestination,
    EnteringDetails,
}

impl fmt::Display for TripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TripState::Idle => "idle",
            TripState::TripActive => "trip active",
            TripState::ConfirmingDestination => "confirming destination",
            TripState::EnteringDetails => "entering details",
        };
        f.write_str(name)
    }
}

/// Everything that can happen to the controller, from the user or from
/// async work finishing.
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    GrantConsent,
    RevokeConsent,
    StartTrip,
    PositionFixed(PositionResult),
    OriginResolved { trip_id: i64, name: String },
    Sample { subscription: u64, result: PositionResult },
    EndTripRequested,
    UserPick(Coordinate),
    LookupDue { generation: u64 },
    AddressResolved { generation: u64, name: String },
    ConfirmDestination,
    SubmitDetails { mode: TransportMode, companions: u32 },
    Cancel,
}

impl TripEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TripEvent::GrantConsent => "grant consent",
            TripEvent::RevokeConsent => "revoke consent",
            TripEvent::StartTrip => "start trip",
            TripEvent::PositionFixed(_) => "position fix",
            TripEvent::OriginResolved { .. } => "origin resolved",
            TripEvent::Sample { .. } => "sample",
            TripEvent::EndTripRequested => "end trip",
            TripEvent::UserPick(_) => "pick destination",
            TripEvent::LookupDue { .. } => "lookup due",
            TripEvent::AddressResolved { .. } => "address resolved",
            TripEvent::ConfirmDestination => "confirm destination",
            TripEvent::SubmitDetails { .. } => "submit details",
            TripEvent::Cancel => "cancel",
        }
    }
}

/// Side effects the controller asks for. It never performs them itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestPositionFix,
    StartTracking { subscription: u64 },
    StopTracking,
    ResolveOrigin { trip_id: i64, coords: Coordinate },
    ResolveAddress { generation: u64, coords: Coordinate },
    ScheduleLookup { generation: u64, delay: Duration },
    Persist,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TripError {
    #[error("location consent has not been given")]
    ConsentRequired,
    #[error("a trip is already in progress")]
    TripAlreadyActive,
    #[error("already waiting for a location fix")]
    FixPending,
    #[error("cannot {event} while {state}")]
    InvalidTransition { state: TripState, event: &'static str },
    #[error("still looking up the destination address")]
    LookupInFlight,
    #[error("cannot revoke consent while a trip is in progress")]
    TripInProgress,
    #[error("trip cannot be finalized without an active trip and a confirmed destination")]
    IncompleteFinalization,
    #[error("{0} is not a valid position")]
    InvalidCoordinate(Coordinate),
}

/// Destination candidate while the user is confirming where they ended.
#[derive(Debug, Clone, PartialEq)]
struct DestinationDraft {
    coords: Coordinate,
    /// None while a lookup for `coords` is outstanding
    address: Option<String>,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Active,
    Confirming(DestinationDraft),
    Details(ConfirmedDestination),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationView {
    pub coords: Coordinate,
    pub address: Option<String>,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: TripState,
    pub consent: bool,
    pub active_trip: Option<ActiveTrip>,
    pub history: Vec<Trip>,
    pub current_position: Option<Coordinate>,
    pub destination: Option<DestinationView>,
    pub status: Option<String>,
    pub warning: Option<String>,
    pub tracking: bool,
}

/// The trip lifecycle state machine.
///
/// Owns consent, history and the active trip. Events go in through
/// [`TripController::handle`], which either rejects them without touching
/// anything or applies them and returns the commands to run.
pub struct TripController {
    consent: bool,
    history: Vec<Trip>,
    active_trip: Option<ActiveTrip>,
    phase: Phase,

    fix_pending: bool,
    subscription: Option<u64>,
    next_subscription: u64,
    lookup_generation: u64,

    current_position: Option<Coordinate>,
    status: Option<String>,
    warning: Option<String>,
    debounce: Duration,
}

impl TripController {
    pub fn load(data_manager: &DataManager, debounce: Duration) -> Self {
        Self::from_state(data_manager.load(), debounce)
    }

    /// A restored active trip puts the controller straight into `TripActive`,
    /// but without a live subscription until [`TripController::resume`].
    pub fn from_state(state: PersistedState, debounce: Duration) -> Self {
        let phase = match &state.active_trip {
            Some(trip) => {
                tracing::info!("Restored trip {} with {} points", trip.id, trip.path.len());
                Phase::Active
            }
            None => Phase::Idle,
        };
        let current_position = state.active_trip.as_ref().map(|trip| trip.last_position());

        Self {
            consent: state.consent,
            history: state.trips,
            active_trip: state.active_trip,
            phase,
            fix_pending: false,
            subscription: None,
            next_subscription: 1,
            lookup_generation: 0,
            current_position,
            status: None,
            warning: None,
            debounce,
        }
    }

    pub fn state(&self) -> TripState {
        match self.phase {
            Phase::Idle => TripState::Idle,
            Phase::Active => TripState::TripActive,
            Phase::Confirming(_) => TripState::ConfirmingDestination,
            Phase::Details(_) => TripState::EnteringDetails,
        }
    }

    pub fn consent(&self) -> bool {
        self.consent
    }

    pub fn active_trip(&self) -> Option<&ActiveTrip> {
        self.active_trip.as_ref()
    }

    /// Newest first
    pub fn history(&self) -> &[Trip] {
        &self.history
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let destination = match &self.phase {
            Phase::Confirming(draft) => Some(DestinationView {
                coords: draft.coords,
                address: draft.address.clone(),
                confirmed: false,
            }),
            Phase::Details(destination) => Some(DestinationView {
                coords: destination.coords,
                address: Some(destination.name.clone()),
                confirmed: true,
            }),
            _ => None,
        };

        ControllerSnapshot {
            state: self.state(),
            consent: self.consent,
            active_trip: self.active_trip.clone(),
            history: self.history.clone(),
            current_position: self.current_position,
            destination,
            status: self.status.clone(),
            warning: self.warning.clone(),
            tracking: self.subscription.is_some(),
        }
    }

    pub fn map_frame(&self) -> MapFrame {
        let end_marker = match &self.phase {
            Phase::Confirming(draft) => Some(draft.coords),
            Phase::Details(destination) => Some(destination.coords),
            _ => None,
        };

        MapFrame {
            path: self.active_trip.as_ref().map(|trip| trip.path.clone()).unwrap_or_default(),
            current_position: self.current_position,
            end_marker,
        }
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            consent: self.consent,
            trips: self.history.clone(),
            active_trip: self.active_trip.clone(),
        }
    }

    pub fn persist(&self, data_manager: &mut DataManager) -> Result<(), DataManagerError> {
        data_manager.save(&self.persisted_state())
    }

    /// Re-establishes live tracking for a trip restored after a restart.
    pub fn resume(&mut self) -> Vec<Command> {
        if self.active_trip.is_none() || self.subscription.is_some() || !self.consent {
            return Vec::new();
        }

        let subscription = self.new_subscription();
        tracing::info!("Resuming live tracking for the restored trip");
        vec![Command::StartTracking { subscription }]
    }

    pub fn handle(&mut self, event: TripEvent) -> Result<Vec<Command>, TripError> {
        self.handle_at(event, Utc::now())
    }

    /// Like [`TripController::handle`], with `now` as the wall clock.
    pub fn handle_at(&mut self, event: TripEvent, now: DateTime<Utc>) -> Result<Vec<Command>, TripError> {
        let event_name = event.name();

        match event {
            TripEvent::GrantConsent => {
                self.consent = true;
                let mut commands = vec![Command::Persist];
                commands.extend(self.resume());
                Ok(commands)
            }
            TripEvent::RevokeConsent => {
                if self.active_trip.is_some() || self.fix_pending {
                    return Err(TripError::TripInProgress);
                }
                self.consent = false;
                Ok(vec![Command::Persist])
            }
            TripEvent::StartTrip => {
                if !self.consent {
                    return Err(TripError::ConsentRequired);
                }
                if self.phase != Phase::Idle {
                    return Err(TripError::TripAlreadyActive);
                }
                if self.fix_pending {
                    return Err(TripError::FixPending);
                }

                self.fix_pending = true;
                self.status = Some(LOCATING_STATUS.to_string());
                self.warning = None;
                Ok(vec![Command::RequestPositionFix])
            }
            TripEvent::PositionFixed(result) => Ok(self.on_position_fixed(result, now)),
            TripEvent::OriginResolved { trip_id, name } => match &mut self.active_trip {
                Some(trip) if trip.id == trip_id => {
                    tracing::debug!("Origin of trip {} is {}", trip_id, name);
                    trip.origin = name;
                    Ok(vec![Command::Persist])
                }
                _ => Ok(Vec::new()),
            },
            TripEvent::Sample { subscription, result } => Ok(self.on_sample(subscription, result)),
            TripEvent::EndTripRequested => {
                let Some(trip) = &self.active_trip else {
                    return Err(self.invalid(event_name));
                };
                if self.phase != Phase::Active {
                    return Err(self.invalid(event_name));
                }

                let coords = trip.last_position();
                let generation = self.next_generation();
                self.phase = Phase::Confirming(DestinationDraft {
                    coords,
                    address: None,
                    generation,
                });
                tracing::info!("Ending trip, destination candidate {}", coords);
                Ok(vec![Command::ResolveAddress { generation, coords }])
            }
            TripEvent::UserPick(coords) => {
                if !matches!(self.phase, Phase::Confirming(_)) {
                    return Err(self.invalid(event_name));
                }
                if !coords.is_finite() {
                    return Err(TripError::InvalidCoordinate(coords));
                }

                let generation = self.next_generation();
                self.phase = Phase::Confirming(DestinationDraft {
                    coords,
                    address: None,
                    generation,
                });
                Ok(vec![Command::ScheduleLookup {
                    generation,
                    delay: self.debounce,
                }])
            }
            TripEvent::LookupDue { generation } => match &self.phase {
                Phase::Confirming(draft) if draft.generation == generation => Ok(vec![Command::ResolveAddress {
                    generation,
                    coords: draft.coords,
                }]),
                _ => Ok(Vec::new()),
            },
            TripEvent::AddressResolved { generation, name } => {
                match &mut self.phase {
                    Phase::Confirming(draft) if draft.generation == generation => {
                        draft.address = Some(name);
                    }
                    _ => tracing::debug!("Dropping stale address {:?} (generation {})", name, generation),
                }
                Ok(Vec::new())
            }
            TripEvent::ConfirmDestination => {
                let Phase::Confirming(draft) = &self.phase else {
                    return Err(self.invalid(event_name));
                };
                let Some(name) = &draft.address else {
                    return Err(TripError::LookupInFlight);
                };

                self.phase = Phase::Details(ConfirmedDestination {
                    coords: draft.coords,
                    name: name.clone(),
                });
                Ok(Vec::new())
            }
            TripEvent::SubmitDetails { mode, companions } => {
                let Phase::Details(destination) = &self.phase else {
                    return Err(self.invalid(event_name));
                };
                let Some(active) = &self.active_trip else {
                    return Err(TripError::IncompleteFinalization);
                };

                let trip = finalize_trip(active, destination, mode, companions, now);
                tracing::info!("Trip {} saved: {}", trip.id, trip.summary());

                self.history.insert(0, trip);
                self.active_trip = None;
                self.phase = Phase::Idle;
                self.subscription = None;
                self.current_position = None;
                self.warning = None;
                Ok(vec![Command::StopTracking, Command::Persist])
            }
            TripEvent::Cancel => match self.phase {
                Phase::Confirming(_) | Phase::Details(_) => {
                    self.phase = Phase::Active;
                    Ok(Vec::new())
                }
                _ => Err(self.invalid(event_name)),
            },
        }
    }

    fn on_position_fixed(&mut self, result: PositionResult, now: DateTime<Utc>) -> Vec<Command> {
        if !self.fix_pending {
            tracing::debug!("Ignoring a position fix nobody asked for");
            return Vec::new();
        }
        self.fix_pending = false;
        self.status = None;

        let coords = match finite(result) {
            Ok(coords) => coords,
            Err(err) => {
                tracing::warn!("Start fix failed: {}", err);
                self.warning = Some(format!("Could not get location: {err}. Please enable location services."));
                return Vec::new();
            }
        };

        // Ids are start times in millis, nudged past any existing id
        let newest_id = self.history.iter().map(|trip| trip.id).max().unwrap_or(i64::MIN);
        let trip_id = now.timestamp_millis().max(newest_id.saturating_add(1));

        let trip = ActiveTrip::new(trip_id, coords.fallback_name(), now, coords);
        tracing::info!("Trip {} started at {}", trip_id, coords);

        self.active_trip = Some(trip);
        self.phase = Phase::Active;
        self.current_position = Some(coords);
        let subscription = self.new_subscription();

        vec![
            Command::StartTracking { subscription },
            Command::ResolveOrigin { trip_id, coords },
            Command::Persist,
        ]
    }

    fn on_sample(&mut self, subscription: u64, result: PositionResult) -> Vec<Command> {
        if self.subscription != Some(subscription) {
            tracing::trace!("Dropping sample from old subscription {}", subscription);
            return Vec::new();
        }

        match finite(result) {
            Ok(coords) => {
                self.current_position = Some(coords);
                self.warning = None;

                match (&self.phase, &mut self.active_trip) {
                    (Phase::Active, Some(trip)) => {
                        trip.append(coords);
                        vec![Command::Persist]
                    }
                    _ => Vec::new(),
                }
            }
            Err(err) => {
                tracing::warn!("Live location error: {}", err);
                self.warning = Some(format!("Live location error: {err}"));
                Vec::new()
            }
        }
    }

    fn new_subscription(&mut self) -> u64 {
        let subscription = self.next_subscription;
        self.next_subscription += 1;
        self.subscription = Some(subscription);
        subscription
    }

    fn next_generation(&mut self) -> u64 {
        self.lookup_generation += 1;
        self.lookup_generation
    }

    fn invalid(&self, event: &'static str) -> TripError {
        TripError::InvalidTransition {
            state: self.state(),
            event,
        }
    }
}

/// A device reading of NaN or infinity counts as no reading at all.
fn finite(result: PositionResult) -> PositionResult {
    match result {
        Ok(coords) if !coords.is_finite() => Err(PositionError::Unavailable(format!("device reported {coords}"))),
        other => other,
    }
}
