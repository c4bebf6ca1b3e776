use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use trip_diary_data_management::DataManager;

use crate::{
    controller::{Command, ControllerSnapshot, TripController, TripEvent, TripState},
    geocoding::Geocoder,
    map_view::MapView,
    position::{PositionResult, PositionSource},
    tracker::LivePathTracker,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AppMessage {
    Trip(TripEvent),
    ShowStatus,
    ShowHistory,
    Shutdown,
}

impl From<TripEvent> for AppMessage {
    fn from(event: TripEvent) -> Self {
        AppMessage::Trip(event)
    }
}

/// What has already been shown to the user, so only changes are printed.
#[derive(Debug, Default, PartialEq)]
struct Shown {
    state: Option<TripState>,
    status: Option<String>,
    warning: Option<String>,
    address: Option<String>,
}

/// Runs the controller. Every state change happens on the task that calls
/// [`Dispatcher::run`]; async work is spawned and reports back through the
/// channel, so nothing here needs a lock.
pub struct Dispatcher {
    controller: TripController,
    data_manager: DataManager,
    tracker: LivePathTracker,
    source: Arc<dyn PositionSource>,
    geocoder: Arc<dyn Geocoder>,
    map: Box<dyn MapView>,
    shown: Shown,

    tx: UnboundedSender<AppMessage>,
    rx: UnboundedReceiver<AppMessage>,
}

impl Dispatcher {
    pub fn new(
        controller: TripController,
        data_manager: DataManager,
        source: Arc<dyn PositionSource>,
        geocoder: Arc<dyn Geocoder>,
        map: Box<dyn MapView>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            controller,
            data_manager,
            tracker: LivePathTracker::new(source.clone()),
            source,
            geocoder,
            map,
            shown: Shown::default(),
            tx,
            rx,
        }
    }

    pub fn sender(&self) -> UnboundedSender<AppMessage> {
        self.tx.clone()
    }

    pub fn controller(&self) -> &TripController {
        &self.controller
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// Picks up a trip that was in progress when the app last stopped.
    pub fn resume(&mut self) {
        let commands = self.controller.resume();
        self.execute_all(commands);
        self.present();
    }

    pub async fn run(mut self) {
        self.resume();
        while self.step().await {}
        self.shutdown();
    }

    /// Handles the next message. False once the app should stop.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => self.dispatch(message),
            None => false,
        }
    }

    pub fn dispatch(&mut self, message: AppMessage) -> bool {
        match message {
            AppMessage::Trip(event) => {
                let event_name = event.name();
                match self.controller.handle(event) {
                    Ok(commands) => self.execute_all(commands),
                    Err(err) => {
                        tracing::info!("Rejected {}: {}", event_name, err);
                        println!("Cannot do that: {err}");
                    }
                }
                self.present();
            }
            AppMessage::ShowStatus => println!("{}", status_report(&self.controller.snapshot())),
            AppMessage::ShowHistory => {
                let history = self.controller.history();
                if history.is_empty() {
                    println!("No trips yet.");
                }
                for trip in history {
                    println!("{}", trip.summary());
                }
            }
            AppMessage::Shutdown => return false,
        }

        true
    }

    fn shutdown(&mut self) {
        self.tracker.stop();
        if let Err(err) = self.controller.persist(&mut self.data_manager) {
            tracing::error!("Failed to save on shutdown: {}", err);
        }
        tracing::info!("Dispatcher stopped");
    }

    fn execute_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        tracing::trace!("Executing {:?}", command);

        match command {
            Command::RequestPositionFix => {
                let source = self.source.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = source.current_position().await;
                    let _ = tx.send(TripEvent::PositionFixed(result).into());
                });
            }
            Command::StartTracking { subscription } => {
                let tx = self.tx.clone();
                self.tracker.start(
                    subscription,
                    Arc::new(move |result: PositionResult| {
                        let _ = tx.send(TripEvent::Sample { subscription, result }.into());
                    }),
                );
            }
            Command::StopTracking => self.tracker.stop(),
            Command::ResolveOrigin { trip_id, coords } => {
                let geocoder = self.geocoder.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let name = geocoder.resolve(coords).await;
                    let _ = tx.send(TripEvent::OriginResolved { trip_id, name }.into());
                });
            }
            Command::ResolveAddress { generation, coords } => {
                let geocoder = self.geocoder.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let name = geocoder.resolve(coords).await;
                    let _ = tx.send(TripEvent::AddressResolved { generation, name }.into());
                });
            }
            Command::ScheduleLookup { generation, delay } => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(TripEvent::LookupDue { generation }.into());
                });
            }
            Command::Persist => {
                if let Err(err) = self.controller.persist(&mut self.data_manager) {
                    tracing::error!("Failed to save trip diary: {}", err);
                }
            }
        }
    }

    /// Prints what changed since last time and redraws the map.
    fn present(&mut self) {
        let snapshot = self.controller.snapshot();
        let address = snapshot.destination.as_ref().and_then(|destination| destination.address.clone());

        if self.shown.state != Some(snapshot.state) {
            println!("State: {}", snapshot.state);
        }
        if let Some(status) = snapshot.status.as_ref().filter(|status| self.shown.status.as_ref() != Some(*status)) {
            println!("{status}");
        }
        if let Some(warning) = snapshot.warning.as_ref().filter(|warning| self.shown.warning.as_ref() != Some(*warning)) {
            println!("Warning: {warning}");
        }
        if let Some(address) = address.as_ref().filter(|address| self.shown.address.as_ref() != Some(*address)) {
            println!("Destination: {address}");
        }

        self.shown = Shown {
            state: Some(snapshot.state),
            status: snapshot.status,
            warning: snapshot.warning,
            address,
        };

        if self.shown.state != Some(TripState::Idle) {
            self.map.render(&self.controller.map_frame());
        }
    }
}

pub fn status_report(snapshot: &ControllerSnapshot) -> String {
    let mut lines = vec![format!(
        "State: {} | consent: {} | live tracking: {}",
        snapshot.state,
        if snapshot.consent { "given" } else { "not given" },
        if snapshot.tracking { "on" } else { "off" }
    )];

    if let Some(trip) = &snapshot.active_trip {
        lines.push(format!(
            "Trip from {} since {}: {} points, {:.2} km",
            trip.origin,
            trip.start_time.format("%H:%M"),
            trip.path.len(),
            trip.distance_so_far_km()
        ));
    }
    if let Some(destination) = &snapshot.destination {
        let address = destination.address.as_deref().unwrap_or("looking up address...");
        lines.push(format!("Destination {}: {}", destination.coords, address));
    }
    if let Some(warning) = &snapshot.warning {
        lines.push(format!("Warning: {warning}"));
    }
    lines.push(format!("{} trips in history", snapshot.history.len()));

    lines.join("\n")
}
