use std::{
    collections::HashMap,
    f64::consts::PI,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use trip_diary_lib::coordinate::Coordinate;

use crate::position::{PositionError, PositionResult, PositionSource, SampleCallback, SubscriptionHandle};

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub start: Coordinate,
    pub fix_delay: Duration,
    pub sample_interval: Duration,
    /// Distance moved per sample, in degrees
    pub step_degrees: f64,
    /// Chance in [0, 1] that a read fails
    pub error_rate: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            start: Coordinate::new(56.1572, 10.2107),
            fix_delay: Duration::from_millis(800),
            sample_interval: Duration::from_secs(2),
            step_degrees: 0.0004,
            error_rate: 0.,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Walker {
    position: Coordinate,
    /// Radians, 0 is north
    heading: f64,
}

impl Walker {
    fn step(&mut self, step_degrees: f64) -> Coordinate {
        self.heading = (self.heading + (rand::random::<f64>() - 0.5) * 0.6) % (2. * PI);
        self.position.lat += step_degrees * self.heading.cos();
        self.position.lon += step_degrees * self.heading.sin();
        self.position
    }
}

/// A device that wanders around a start point, for running without real hardware.
pub struct SimulatedPositionSource {
    settings: SimulationSettings,
    walker: Arc<Mutex<Walker>>,
    watchers: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_handle: AtomicU64,
}

impl SimulatedPositionSource {
    pub fn new(settings: SimulationSettings) -> Self {
        let walker = Walker {
            position: settings.start,
            heading: rand::random::<f64>() * 2. * PI,
        };

        Self {
            settings,
            walker: Arc::new(Mutex::new(walker)),
            watchers: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn position(&self) -> Coordinate {
        self.walker.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).position
    }

    pub fn active_watchers(&self) -> usize {
        self.watchers.lock().map(|watchers| watchers.len()).unwrap_or(0)
    }
}

fn read_fails(error_rate: f64) -> bool {
    error_rate > 0. && rand::random::<f64>() < error_rate
}

#[async_trait::async_trait]
impl PositionSource for SimulatedPositionSource {
    async fn current_position(&self) -> PositionResult {
        tokio::time::sleep(self.settings.fix_delay).await;

        if read_fails(self.settings.error_rate) {
            return Err(PositionError::Unavailable("no satellite fix".into()));
        }

        Ok(self.position())
    }

    fn watch_position(&self, on_sample: SampleCallback) -> SubscriptionHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let walker = self.walker.clone();
        let settings = self.settings.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(settings.sample_interval);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                if read_fails(settings.error_rate) {
                    on_sample(Err(PositionError::Timeout));
                    continue;
                }

                let next = walker
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .step(settings.step_degrees);
                on_sample(Ok(next));
            }
        });

        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.insert(id, task);
        }
        tracing::debug!("Simulated watch {} started", id);

        SubscriptionHandle(id)
    }

    fn cancel(&self, handle: SubscriptionHandle) {
        let task = self.watchers.lock().ok().and_then(|mut watchers| watchers.remove(&handle.0));
        match task {
            Some(task) => {
                task.abort();
                tracing::debug!("Simulated watch {} cancelled", handle.0);
            }
            None => tracing::warn!("Cancel for unknown watch {}", handle.0),
        }
    }
}

impl Drop for SimulatedPositionSource {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.get_mut() {
            for (_, task) in watchers.drain() {
                task.abort();
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn watch_delivers_samples_until_cancelled() {
    let source = SimulatedPositionSource::new(SimulationSettings {
        fix_delay: Duration::from_millis(10),
        sample_interval: Duration::from_millis(100),
        ..Default::default()
    });

    let start = source.current_position().await.unwrap();
    assert_eq!(start, SimulationSettings::default().start);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = source.watch_position(Arc::new(move |sample: PositionResult| {
        let _ = tx.send(sample);
    }));
    assert_eq!(source.active_watchers(), 1);

    let mut samples = Vec::new();
    for _ in 0..3 {
        samples.push(rx.recv().await.unwrap().unwrap());
    }
    assert_ne!(samples[0], start);
    assert_eq!(source.position(), samples[2]);

    source.cancel(handle);
    assert_eq!(source.active_watchers(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn always_failing_source_reports_errors() {
    let source = SimulatedPositionSource::new(SimulationSettings {
        error_rate: 1.,
        ..Default::default()
    });

    assert!(matches!(source.current_position().await, Err(PositionError::Unavailable(_))));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    source.watch_position(Arc::new(move |sample: PositionResult| {
        let _ = tx.send(sample);
    }));
    assert_eq!(rx.recv().await.unwrap(), Err(PositionError::Timeout));
}
