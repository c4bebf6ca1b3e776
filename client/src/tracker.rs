use std::sync::Arc;

use crate::position::{PositionSource, SampleCallback, SubscriptionHandle};

/// Owns the live subscription of the active trip.
///
/// The controller hands out a token per subscription; the callback is
/// expected to tag each sample with it, so samples still in flight after
/// [`LivePathTracker::stop`] can be told apart from the current stream.
pub struct LivePathTracker {
    source: Arc<dyn PositionSource>,
    subscription: Option<(u64, SubscriptionHandle)>,
}

impl LivePathTracker {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self {
            source,
            subscription: None,
        }
    }

    pub fn start(&mut self, token: u64, on_sample: SampleCallback) {
        if let Some((previous, _)) = self.subscription {
            tracing::warn!("Replacing live subscription {} with {}", previous, token);
            self.stop();
        }

        let handle = self.source.watch_position(on_sample);
        tracing::info!("Live tracking started (subscription {})", token);
        self.subscription = Some((token, handle));
    }

    pub fn stop(&mut self) {
        if let Some((token, handle)) = self.subscription.take() {
            self.source.cancel(handle);
            tracing::info!("Live tracking stopped (subscription {})", token);
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn token(&self) -> Option<u64> {
        self.subscription.map(|(token, _)| token)
    }
}

impl Drop for LivePathTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_watch() {
    use crate::{
        position::PositionResult,
        simulator::{SimulatedPositionSource, SimulationSettings},
    };

    let source = Arc::new(SimulatedPositionSource::new(SimulationSettings::default()));
    let mut tracker = LivePathTracker::new(source.clone());

    tracker.start(1, Arc::new(|_: PositionResult| {}));
    assert!(tracker.is_tracking());
    assert_eq!(tracker.token(), Some(1));
    assert_eq!(source.active_watchers(), 1);

    tracker.start(2, Arc::new(|_: PositionResult| {}));
    assert_eq!(source.active_watchers(), 1);

    tracker.stop();
    assert!(!tracker.is_tracking());
    assert_eq!(source.active_watchers(), 0);

    // Stopping twice is harmless
    tracker.stop();
}
