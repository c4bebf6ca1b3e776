use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use trip_diary_data_management::{DataManagerError, gpx_util};
use trip_diary_lib::coordinate::Coordinate;

use crate::position::{PositionError, PositionResult, PositionSource, SampleCallback, SubscriptionHandle};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Gpx(#[from] DataManagerError),
    #[error("recording has no track points")]
    Empty,
}

/// Plays back a recorded GPX track as if it were a live device.
///
/// The one-shot fix reports the current point without advancing. Every watch
/// tick advances through the recording, which is shared by all watchers.
pub struct GpxPositionSource {
    points: Arc<Vec<Coordinate>>,
    cursor: Arc<AtomicUsize>,
    sample_interval: Duration,
    watchers: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_handle: AtomicU64,
}

impl GpxPositionSource {
    pub fn open(path: &Path, sample_interval: Duration) -> Result<Self, ReplayError> {
        let points = gpx_util::read_gpx(path)?;
        tracing::info!("Replaying {} points from {:?}", points.len(), path);
        Self::from_points(points, sample_interval)
    }

    pub fn from_points(points: Vec<Coordinate>, sample_interval: Duration) -> Result<Self, ReplayError> {
        if points.is_empty() {
            return Err(ReplayError::Empty);
        }

        Ok(Self {
            points: Arc::new(points),
            cursor: Arc::new(AtomicUsize::new(0)),
            sample_interval,
            watchers: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    pub fn remaining(&self) -> usize {
        self.points.len().saturating_sub(self.cursor.load(Ordering::Relaxed) + 1)
    }
}

#[async_trait::async_trait]
impl PositionSource for GpxPositionSource {
    async fn current_position(&self) -> PositionResult {
        let index = self.cursor.load(Ordering::Relaxed).min(self.points.len() - 1);
        Ok(self.points[index])
    }

    fn watch_position(&self, on_sample: SampleCallback) -> SubscriptionHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let points = self.points.clone();
        let cursor = self.cursor.clone();
        let sample_interval = self.sample_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sample_interval);
            interval.tick().await;

            loop {
                interval.tick().await;

                let index = cursor.fetch_add(1, Ordering::Relaxed) + 1;
                match points.get(index) {
                    Some(point) => on_sample(Ok(*point)),
                    None => {
                        on_sample(Err(PositionError::Unavailable("end of recording".into())));
                        break;
                    }
                }
            }
        });

        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.insert(id, task);
        }

        SubscriptionHandle(id)
    }

    fn cancel(&self, handle: SubscriptionHandle) {
        if let Some(task) = self.watchers.lock().ok().and_then(|mut watchers| watchers.remove(&handle.0)) {
            task.abort();
        }
    }
}

impl Drop for GpxPositionSource {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.get_mut() {
            for (_, task) in watchers.drain() {
                task.abort();
            }
        }
    }
}

#[test]
fn empty_recording_is_rejected() {
    assert!(matches!(
        GpxPositionSource::from_points(Vec::new(), Duration::from_secs(1)),
        Err(ReplayError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn replays_points_in_order_then_reports_the_end() {
    let points = vec![Coordinate::new(1., 1.), Coordinate::new(1., 2.), Coordinate::new(1., 3.)];
    let source = GpxPositionSource::from_points(points.clone(), Duration::from_secs(1)).unwrap();

    assert_eq!(source.current_position().await.unwrap(), points[0]);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    source.watch_position(Arc::new(move |sample: PositionResult| {
        let _ = tx.send(sample);
    }));

    assert_eq!(rx.recv().await.unwrap(), Ok(points[1]));
    assert_eq!(rx.recv().await.unwrap(), Ok(points[2]));
    assert_eq!(source.remaining(), 0);
    assert!(matches!(rx.recv().await.unwrap(), Err(PositionError::Unavailable(_))));
    // The task ended, dropping its sender
    assert!(rx.recv().await.is_none());
}

#[test]
fn opens_a_gpx_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track.gpx");
    std::fs::write(
        &path,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="56.15" lon="10.21"></trkpt>
    <trkpt lat="56.16" lon="10.22"></trkpt>
  </trkseg></trk>
</gpx>"#,
    )
    .unwrap();

    let source = GpxPositionSource::open(&path, Duration::from_secs(1)).unwrap();
    assert_eq!(source.remaining(), 1);
}
