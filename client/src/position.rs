use std::sync::Arc;

use trip_diary_lib::coordinate::Coordinate;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("timed out waiting for a position")]
    Timeout,
}

pub type PositionResult = Result<Coordinate, PositionError>;

/// Receives every sample of a live subscription, successful or not.
pub type SampleCallback = Arc<dyn Fn(PositionResult) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Where positions come from. Accuracy, sampling rate and timeouts are the
/// source's own business.
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> PositionResult;

    fn watch_position(&self, on_sample: SampleCallback) -> SubscriptionHandle;

    fn cancel(&self, handle: SubscriptionHandle);
}
