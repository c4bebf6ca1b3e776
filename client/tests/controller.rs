use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use trip_diary::{
    console::ConsoleCommand,
    controller::{Command, LOCATING_STATUS, TripController, TripError, TripEvent, TripState},
    dispatcher::AppMessage,
    position::PositionError,
};
use trip_diary_data_management::{ACTIVE_TRIP_KEY, DataManager, MemoryStore, PersistedState};
use trip_diary_lib::{active_trip::ActiveTrip, coordinate::Coordinate, geometry::distance_km, trip::TransportMode};

const DEBOUNCE: Duration = Duration::from_millis(500);

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
}

fn consenting_controller() -> TripController {
    TripController::from_state(
        PersistedState {
            consent: true,
            ..Default::default()
        },
        DEBOUNCE,
    )
}

/// Starts a trip at `start` and returns the live subscription token.
fn start_trip(controller: &mut TripController, start: Coordinate) -> u64 {
    assert_eq!(controller.handle_at(TripEvent::StartTrip, now()).unwrap(), vec![Command::RequestPositionFix]);

    let commands = controller.handle_at(TripEvent::PositionFixed(Ok(start)), now()).unwrap();
    commands
        .iter()
        .find_map(|command| match command {
            Command::StartTracking { subscription } => Some(*subscription),
            _ => None,
        })
        .unwrap()
}

fn sample(controller: &mut TripController, subscription: u64, coords: Coordinate) -> Vec<Command> {
    controller
        .handle_at(
            TripEvent::Sample {
                subscription,
                result: Ok(coords),
            },
            now(),
        )
        .unwrap()
}

fn generation_of(commands: &[Command]) -> u64 {
    commands
        .iter()
        .find_map(|command| match command {
            Command::ResolveAddress { generation, .. } | Command::ScheduleLookup { generation, .. } => Some(*generation),
            _ => None,
        })
        .unwrap()
}

/// Drives a fresh trip over `path` into `EnteringDetails` at `destination`.
fn trip_awaiting_details(path: &[Coordinate], destination: Coordinate) -> TripController {
    let mut controller = consenting_controller();
    let subscription = start_trip(&mut controller, path[0]);
    for coords in &path[1..] {
        sample(&mut controller, subscription, *coords);
    }

    controller.handle_at(TripEvent::EndTripRequested, now()).unwrap();
    let generation = generation_of(&controller.handle_at(TripEvent::UserPick(destination), now()).unwrap());
    controller.handle_at(TripEvent::LookupDue { generation }, now()).unwrap();
    controller
        .handle_at(
            TripEvent::AddressResolved {
                generation,
                name: "Office".into(),
            },
            now(),
        )
        .unwrap();
    controller.handle_at(TripEvent::ConfirmDestination, now()).unwrap();
    assert_eq!(controller.state(), TripState::EnteringDetails);

    controller
}

#[test]
fn start_requires_consent() {
    let mut controller = TripController::from_state(PersistedState::default(), DEBOUNCE);

    assert_eq!(controller.handle(TripEvent::StartTrip), Err(TripError::ConsentRequired));
    assert_eq!(controller.state(), TripState::Idle);
}

#[test]
fn successful_fix_starts_a_trip() {
    let mut controller = consenting_controller();
    let start = Coordinate::new(56.1572, 10.2107);

    controller.handle_at(TripEvent::StartTrip, now()).unwrap();
    assert_eq!(controller.snapshot().status.as_deref(), Some(LOCATING_STATUS));
    assert_eq!(controller.state(), TripState::Idle);

    let commands = controller.handle_at(TripEvent::PositionFixed(Ok(start)), now()).unwrap();
    let trip = controller.active_trip().unwrap().clone();
    assert_eq!(
        commands,
        vec![
            Command::StartTracking { subscription: 1 },
            Command::ResolveOrigin {
                trip_id: trip.id,
                coords: start
            },
            Command::Persist,
        ]
    );

    assert_eq!(controller.state(), TripState::TripActive);
    assert_eq!(trip.path, vec![start]);
    assert_eq!(trip.start_coords, start);
    assert_eq!(trip.start_time, now());
    assert_eq!(trip.id, now().timestamp_millis());
    assert_eq!(trip.origin, "Location near (56.1572, 10.2107)");

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, None);
    assert!(snapshot.tracking);
    assert_eq!(snapshot.current_position, Some(start));
}

#[test]
fn failed_fix_stays_idle_with_a_warning() {
    let mut controller = consenting_controller();

    controller.handle_at(TripEvent::StartTrip, now()).unwrap();
    let commands = controller
        .handle_at(TripEvent::PositionFixed(Err(PositionError::PermissionDenied)), now())
        .unwrap();

    assert!(commands.is_empty());
    assert_eq!(controller.state(), TripState::Idle);
    assert!(controller.active_trip().is_none());
    assert!(controller.warning().unwrap().starts_with("Could not get location: permission denied"));

    // A later attempt is allowed and clears the warning
    controller.handle_at(TripEvent::StartTrip, now()).unwrap();
    assert_eq!(controller.warning(), None);
}

#[test]
fn start_is_rejected_while_pending_or_active() {
    let mut controller = consenting_controller();

    controller.handle_at(TripEvent::StartTrip, now()).unwrap();
    let pending = controller.snapshot();
    assert_eq!(controller.handle_at(TripEvent::StartTrip, now()), Err(TripError::FixPending));
    assert_eq!(controller.snapshot(), pending);

    controller
        .handle_at(TripEvent::PositionFixed(Ok(Coordinate::new(1., 1.))), now())
        .unwrap();
    let active = controller.snapshot();
    assert_eq!(controller.handle_at(TripEvent::StartTrip, now()), Err(TripError::TripAlreadyActive));
    assert_eq!(controller.snapshot(), active);

    // A second fix nobody asked for changes nothing
    let commands = controller
        .handle_at(TripEvent::PositionFixed(Ok(Coordinate::new(2., 2.))), now())
        .unwrap();
    assert!(commands.is_empty());
    assert_eq!(controller.snapshot(), active);
}

#[test]
fn samples_are_appended_in_delivery_order() {
    let mut controller = consenting_controller();
    let start = Coordinate::new(0., 0.);
    let subscription = start_trip(&mut controller, start);

    let samples: Vec<Coordinate> = (1..=5).map(|i| Coordinate::new(0., i as f64 * 0.001)).collect();
    for coords in &samples {
        assert_eq!(sample(&mut controller, subscription, *coords), vec![Command::Persist]);
    }

    // No dedup either
    sample(&mut controller, subscription, samples[4]);

    let path = &controller.active_trip().unwrap().path;
    assert_eq!(path.len(), 1 + samples.len() + 1);
    assert_eq!(path[0], start);
    assert_eq!(&path[1..6], samples.as_slice());
    assert_eq!(controller.snapshot().current_position, Some(samples[4]));
}

#[test]
fn samples_from_an_old_subscription_are_dropped() {
    let mut controller = consenting_controller();
    let subscription = start_trip(&mut controller, Coordinate::new(0., 0.));
    let before = controller.snapshot();

    assert!(sample(&mut controller, subscription + 1, Coordinate::new(5., 5.)).is_empty());
    assert_eq!(controller.snapshot(), before);
}

#[test]
fn live_errors_warn_without_appending() {
    let mut controller = consenting_controller();
    let subscription = start_trip(&mut controller, Coordinate::new(0., 0.));

    let commands = controller
        .handle_at(
            TripEvent::Sample {
                subscription,
                result: Err(PositionError::Timeout),
            },
            now(),
        )
        .unwrap();
    assert!(commands.is_empty());
    assert_eq!(controller.active_trip().unwrap().path.len(), 1);
    assert_eq!(controller.warning(), Some("Live location error: timed out waiting for a position"));
    assert_eq!(controller.state(), TripState::TripActive);

    sample(&mut controller, subscription, Coordinate::new(0., 0.001));
    assert_eq!(controller.warning(), None);
    assert_eq!(controller.active_trip().unwrap().path.len(), 2);
}

#[test]
fn non_finite_fix_stays_idle_with_a_warning() {
    let mut controller = consenting_controller();

    controller.handle_at(TripEvent::StartTrip, now()).unwrap();
    let commands = controller
        .handle_at(TripEvent::PositionFixed(Ok(Coordinate::new(f64::NAN, 10.))), now())
        .unwrap();

    assert!(commands.is_empty());
    assert_eq!(controller.state(), TripState::Idle);
    assert!(controller.active_trip().is_none());
    assert!(controller.warning().unwrap().starts_with("Could not get location: position unavailable"));
}

#[test]
fn non_finite_samples_warn_without_appending() {
    let mut controller = consenting_controller();
    let start = Coordinate::new(0., 0.);
    let subscription = start_trip(&mut controller, start);

    let commands = controller
        .handle_at(
            TripEvent::Sample {
                subscription,
                result: Ok(Coordinate::new(0., f64::INFINITY)),
            },
            now(),
        )
        .unwrap();

    assert!(commands.is_empty());
    assert_eq!(controller.active_trip().unwrap().path, vec![start]);
    assert_eq!(controller.snapshot().current_position, Some(start));
    assert!(controller.warning().unwrap().starts_with("Live location error: position unavailable"));
}

#[test]
fn non_finite_picks_are_rejected_and_history_survives_a_reload() {
    let store = MemoryStore::new();
    let mut data_manager = DataManager::new(store.clone());

    let mut controller = trip_awaiting_details(&[Coordinate::new(0., 0.)], Coordinate::new(0., 0.01));
    controller
        .handle_at(
            TripEvent::SubmitDetails {
                mode: TransportMode::Walk,
                companions: 0,
            },
            now(),
        )
        .unwrap();
    controller.persist(&mut data_manager).unwrap();

    let subscription = start_trip(&mut controller, Coordinate::new(1., 1.));
    sample(&mut controller, subscription, Coordinate::new(1., 1.001));
    controller.handle_at(TripEvent::EndTripRequested, now()).unwrap();
    let before = controller.snapshot();

    for line in ["pick NaN 0", "pick 0 inf", "pick 1e400 0"] {
        let AppMessage::Trip(event) = ConsoleCommand::parse_line(line).unwrap().into_message() else {
            panic!("`{line}` is not a trip event");
        };
        assert!(matches!(
            controller.handle_at(event, now()),
            Err(TripError::InvalidCoordinate(_))
        ));
        assert_eq!(controller.snapshot(), before);
    }

    let generation = generation_of(&controller.handle_at(TripEvent::UserPick(Coordinate::new(1., 1.01)), now()).unwrap());
    controller.handle_at(TripEvent::LookupDue { generation }, now()).unwrap();
    controller
        .handle_at(
            TripEvent::AddressResolved {
                generation,
                name: "Harbour".into(),
            },
            now(),
        )
        .unwrap();
    controller.handle_at(TripEvent::ConfirmDestination, now()).unwrap();
    controller
        .handle_at(
            TripEvent::SubmitDetails {
                mode: TransportMode::Bus,
                companions: 1,
            },
            now(),
        )
        .unwrap();
    controller.persist(&mut data_manager).unwrap();

    let reloaded = TripController::load(&DataManager::new(store), DEBOUNCE);
    assert_eq!(reloaded.history().len(), 2);
    assert_eq!(reloaded.history(), controller.history());
}

#[test]
fn origin_is_filled_in_by_the_lookup() {
    let mut controller = consenting_controller();
    start_trip(&mut controller, Coordinate::new(0., 0.));
    let trip_id = controller.active_trip().unwrap().id;

    let stale = controller
        .handle_at(
            TripEvent::OriginResolved {
                trip_id: trip_id - 1,
                name: "Elsewhere".into(),
            },
            now(),
        )
        .unwrap();
    assert!(stale.is_empty());

    let commands = controller
        .handle_at(
            TripEvent::OriginResolved {
                trip_id,
                name: "Home".into(),
            },
            now(),
        )
        .unwrap();
    assert_eq!(commands, vec![Command::Persist]);
    assert_eq!(controller.active_trip().unwrap().origin, "Home");
}

#[test]
fn ending_proposes_the_last_point() {
    let mut controller = consenting_controller();
    let subscription = start_trip(&mut controller, Coordinate::new(0., 0.));
    let last = Coordinate::new(0., 0.003);
    sample(&mut controller, subscription, last);

    let commands = controller.handle_at(TripEvent::EndTripRequested, now()).unwrap();
    let generation = generation_of(&commands);
    assert_eq!(commands, vec![Command::ResolveAddress { generation, coords: last }]);
    assert_eq!(controller.state(), TripState::ConfirmingDestination);

    let destination = controller.snapshot().destination.unwrap();
    assert_eq!(destination.coords, last);
    assert_eq!(destination.address, None);
    assert_eq!(controller.map_frame().end_marker, Some(last));

    assert_eq!(controller.handle_at(TripEvent::ConfirmDestination, now()), Err(TripError::LookupInFlight));

    controller
        .handle_at(
            TripEvent::AddressResolved {
                generation,
                name: "Harbour".into(),
            },
            now(),
        )
        .unwrap();
    controller.handle_at(TripEvent::ConfirmDestination, now()).unwrap();
    assert_eq!(controller.state(), TripState::EnteringDetails);
    assert_eq!(controller.snapshot().destination.unwrap().address.as_deref(), Some("Harbour"));
}

#[test]
fn picks_are_looked_up_after_the_quiet_period_only() {
    let mut controller = consenting_controller();
    start_trip(&mut controller, Coordinate::new(0., 0.));
    controller.handle_at(TripEvent::EndTripRequested, now()).unwrap();

    let first = Coordinate::new(0., 0.1);
    let second = Coordinate::new(0., 0.2);
    let first_generation = generation_of(&controller.handle_at(TripEvent::UserPick(first), now()).unwrap());
    let commands = controller.handle_at(TripEvent::UserPick(second), now()).unwrap();
    let second_generation = generation_of(&commands);
    assert_eq!(
        commands,
        vec![Command::ScheduleLookup {
            generation: second_generation,
            delay: DEBOUNCE
        }]
    );

    assert!(
        controller
            .handle_at(TripEvent::LookupDue { generation: first_generation }, now())
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        controller
            .handle_at(TripEvent::LookupDue { generation: second_generation }, now())
            .unwrap(),
        vec![Command::ResolveAddress {
            generation: second_generation,
            coords: second
        }]
    );
}

#[test]
fn out_of_order_lookups_keep_the_newest_address() {
    let mut controller = consenting_controller();
    start_trip(&mut controller, Coordinate::new(0., 0.));

    let generation_a = generation_of(&controller.handle_at(TripEvent::EndTripRequested, now()).unwrap());
    let point_b = Coordinate::new(0., 0.2);
    let generation_b = generation_of(&controller.handle_at(TripEvent::UserPick(point_b), now()).unwrap());

    controller
        .handle_at(
            TripEvent::AddressResolved {
                generation: generation_b,
                name: "B street".into(),
            },
            now(),
        )
        .unwrap();
    controller
        .handle_at(
            TripEvent::AddressResolved {
                generation: generation_a,
                name: "A street".into(),
            },
            now(),
        )
        .unwrap();

    let destination = controller.snapshot().destination.unwrap();
    assert_eq!(destination.coords, point_b);
    assert_eq!(destination.address.as_deref(), Some("B street"));
}

#[test]
fn a_stale_address_does_not_unblock_confirmation() {
    let mut controller = consenting_controller();
    start_trip(&mut controller, Coordinate::new(0., 0.));

    let generation_a = generation_of(&controller.handle_at(TripEvent::EndTripRequested, now()).unwrap());
    controller
        .handle_at(TripEvent::UserPick(Coordinate::new(0., 0.2)), now())
        .unwrap();
    controller
        .handle_at(
            TripEvent::AddressResolved {
                generation: generation_a,
                name: "A street".into(),
            },
            now(),
        )
        .unwrap();

    assert_eq!(controller.handle_at(TripEvent::ConfirmDestination, now()), Err(TripError::LookupInFlight));
}

#[test]
fn cancel_returns_to_recording_with_the_path_untouched() {
    let path = [Coordinate::new(0., 0.), Coordinate::new(0., 0.001)];
    let mut controller = trip_awaiting_details(&path, Coordinate::new(0., 0.002));
    let trip_before = controller.active_trip().unwrap().clone();

    let commands = controller.handle_at(TripEvent::Cancel, now()).unwrap();
    assert!(!commands.contains(&Command::StopTracking));
    assert_eq!(controller.state(), TripState::TripActive);
    assert_eq!(controller.active_trip().unwrap(), &trip_before);
    assert!(controller.snapshot().tracking);
    assert_eq!(controller.snapshot().destination, None);

    // And again from the confirming step
    controller.handle_at(TripEvent::EndTripRequested, now()).unwrap();
    controller.handle_at(TripEvent::Cancel, now()).unwrap();
    assert_eq!(controller.state(), TripState::TripActive);
    assert_eq!(controller.active_trip().unwrap(), &trip_before);
}

#[test]
fn cancel_outside_the_ending_flow_is_rejected() {
    let mut controller = consenting_controller();
    assert!(matches!(
        controller.handle_at(TripEvent::Cancel, now()),
        Err(TripError::InvalidTransition {
            state: TripState::Idle,
            ..
        })
    ));

    start_trip(&mut controller, Coordinate::new(0., 0.));
    assert!(controller.handle_at(TripEvent::Cancel, now()).is_err());
    assert!(controller.handle_at(TripEvent::ConfirmDestination, now()).is_err());
    assert!(
        controller
            .handle_at(
                TripEvent::SubmitDetails {
                    mode: TransportMode::Walk,
                    companions: 0
                },
                now()
            )
            .is_err()
    );
}

#[test]
fn samples_while_ending_move_the_marker_but_not_the_path() {
    let mut controller = consenting_controller();
    let subscription = start_trip(&mut controller, Coordinate::new(0., 0.));
    controller.handle_at(TripEvent::EndTripRequested, now()).unwrap();

    let elsewhere = Coordinate::new(0., 0.05);
    assert!(sample(&mut controller, subscription, elsewhere).is_empty());
    assert_eq!(controller.active_trip().unwrap().path.len(), 1);
    assert_eq!(controller.snapshot().current_position, Some(elsewhere));
}

#[test]
fn submit_finalizes_and_returns_to_idle() {
    let path = [Coordinate::new(0., 0.), Coordinate::new(0., 1.)];
    let destination = Coordinate::new(0., 2.);
    let mut controller = trip_awaiting_details(&path, destination);
    let trip_id = controller.active_trip().unwrap().id;
    let end_time = now() + chrono::Duration::minutes(42);

    let commands = controller
        .handle_at(
            TripEvent::SubmitDetails {
                mode: TransportMode::Bus,
                companions: 2,
            },
            end_time,
        )
        .unwrap();
    assert_eq!(commands, vec![Command::StopTracking, Command::Persist]);

    assert_eq!(controller.state(), TripState::Idle);
    assert!(controller.active_trip().is_none());
    assert!(!controller.snapshot().tracking);
    assert_eq!(controller.snapshot().destination, None);

    let trip = &controller.history()[0];
    assert_eq!(trip.id, trip_id);
    assert_eq!(trip.path, vec![path[0], path[1], destination]);
    assert_eq!(trip.destination, "Office");
    assert_eq!(trip.end_coords, destination);
    assert_eq!(trip.mode, TransportMode::Bus);
    assert_eq!(trip.companions, 2);
    assert_eq!(trip.end_time, end_time);
    let expected = distance_km(path[0], path[1]) + distance_km(path[1], destination);
    assert!((trip.distance - expected).abs() < 1e-9);
}

#[test]
fn history_is_newest_first_with_unique_ids() {
    let mut controller = consenting_controller();

    for destination in ["First", "Second"] {
        let subscription = start_trip(&mut controller, Coordinate::new(0., 0.));
        sample(&mut controller, subscription, Coordinate::new(0., 0.01));
        let generation = generation_of(&controller.handle_at(TripEvent::EndTripRequested, now()).unwrap());
        controller
            .handle_at(
                TripEvent::AddressResolved {
                    generation,
                    name: destination.into(),
                },
                now(),
            )
            .unwrap();
        controller.handle_at(TripEvent::ConfirmDestination, now()).unwrap();
        controller
            .handle_at(
                TripEvent::SubmitDetails {
                    mode: TransportMode::Walk,
                    companions: 0,
                },
                now(),
            )
            .unwrap();
    }

    let history = controller.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].destination, "Second");
    assert_eq!(history[1].destination, "First");
    assert!(history[0].id > history[1].id);
}

#[test]
fn consent_can_only_be_revoked_when_nothing_is_recording() {
    let mut controller = consenting_controller();
    start_trip(&mut controller, Coordinate::new(0., 0.));
    assert_eq!(controller.handle_at(TripEvent::RevokeConsent, now()), Err(TripError::TripInProgress));
    assert!(controller.consent());

    let mut controller = consenting_controller();
    assert_eq!(controller.handle_at(TripEvent::RevokeConsent, now()).unwrap(), vec![Command::Persist]);
    assert!(!controller.consent());
    assert_eq!(controller.handle_at(TripEvent::GrantConsent, now()).unwrap(), vec![Command::Persist]);
    assert!(controller.consent());
}

#[test]
fn restored_trip_resumes_tracking() {
    let mut trip = ActiveTrip::new(7, "Home".into(), now(), Coordinate::new(0., 0.));
    trip.append(Coordinate::new(0., 0.001));
    let state = PersistedState {
        consent: true,
        trips: Vec::new(),
        active_trip: Some(trip.clone()),
    };

    let mut controller = TripController::from_state(state, DEBOUNCE);
    assert_eq!(controller.state(), TripState::TripActive);
    assert!(!controller.snapshot().tracking);
    assert_eq!(controller.snapshot().current_position, Some(Coordinate::new(0., 0.001)));

    let commands = controller.resume();
    let [Command::StartTracking { subscription }] = commands.as_slice() else {
        panic!("expected a single StartTracking, got {commands:?}");
    };
    assert!(controller.resume().is_empty());

    sample(&mut controller, *subscription, Coordinate::new(0., 0.002));
    assert_eq!(controller.active_trip().unwrap().path.len(), 3);
}

#[test]
fn restored_trip_without_consent_waits_for_it() {
    let state = PersistedState {
        consent: false,
        trips: Vec::new(),
        active_trip: Some(ActiveTrip::new(7, "Home".into(), now(), Coordinate::new(0., 0.))),
    };

    let mut controller = TripController::from_state(state, DEBOUNCE);
    assert!(controller.resume().is_empty());

    let commands = controller.handle_at(TripEvent::GrantConsent, now()).unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0], Command::Persist);
    assert!(matches!(commands[1], Command::StartTracking { .. }));
}

#[test]
fn state_survives_a_restart_through_the_store() {
    let store = MemoryStore::new();
    let mut data_manager = DataManager::new(store.clone());

    let mut controller = TripController::load(&data_manager, DEBOUNCE);
    controller.handle_at(TripEvent::GrantConsent, now()).unwrap();
    controller.persist(&mut data_manager).unwrap();
    assert!(!store.contains(ACTIVE_TRIP_KEY));

    let reloaded = TripController::load(&DataManager::new(store.clone()), DEBOUNCE);
    assert!(reloaded.consent());
    assert!(reloaded.active_trip().is_none());
    assert_eq!(reloaded.state(), TripState::Idle);

    let subscription = start_trip(&mut controller, Coordinate::new(0., 0.));
    sample(&mut controller, subscription, Coordinate::new(0., 0.001));
    controller.persist(&mut data_manager).unwrap();
    assert!(store.contains(ACTIVE_TRIP_KEY));

    let reloaded = TripController::load(&DataManager::new(store), DEBOUNCE);
    assert_eq!(reloaded.state(), TripState::TripActive);
    assert_eq!(reloaded.active_trip(), controller.active_trip());
}
