//! Single-strategy capture with construction-time fallback
//!
//! Windows and macOS do not walk a chain per capture. The facade instead
//! picks one [`CaptureStrategy`] when it is built: each [`StrategyCandidate`]
//! factory is tried in order and the first one that constructs wins. The
//! selection is recorded with the same [`ChainWalk`] the Linux orchestrator
//! uses, so both shapes produce the same kind of trace.

use std::{ops::ControlFlow, sync::Arc};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{
    chain::{Attempt, ChainWalk, Stage, WalkOutcome},
    context::CaptureRequest,
    provider::CaptureOutcome,
    trace::DecisionTrace,
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{
        BackendCapabilities, BackendType, CaptureKind, CaptureOptions, ConfigurationChanged,
        MonitorInfo, Region, virtual_bounds,
    },
};

/// Trace reason for a factory reporting the strategy is unsupported here
pub const UNSUPPORTED_REASON: &str = "not supported on this system";

/// Capacity of per-strategy configuration-change channels
pub const CONFIGURATION_CHANNEL_CAPACITY: usize = 16;

/// One whole-platform capture mechanism
#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    fn id(&self) -> &str;

    fn stage(&self) -> Stage;

    fn capabilities(&self) -> BackendCapabilities;

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>>;

    /// Captures per `request`; native errors become `Failure`
    async fn capture(&self, request: &CaptureRequest, cancel: &CancellationToken) -> CaptureOutcome;

    /// Captures a physical-pixel region
    ///
    /// Defaults to a full-screen capture cropped to `region`.
    async fn capture_region(
        &self,
        region: Region,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        let request = CaptureRequest::new(CaptureKind::FullScreen).with_options(*options);
        let outcome = self.capture(&request, cancel).await;
        if !outcome.is_success() {
            return outcome;
        }
        let monitors = self
            .monitors()
            .await
            .unwrap_or_else(|_| vec![MonitorInfo::default_display()]);
        crop_outcome(outcome, region, &monitors)
    }

    /// Monitor hot-plug notifications raised by this strategy
    fn configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged>;
}

/// Crops a full-screen success down to `region`
///
/// `region` is in virtual-desktop coordinates; the image origin is the
/// top-left of the monitors' union.
pub fn crop_outcome(outcome: CaptureOutcome, region: Region, monitors: &[MonitorInfo]) -> CaptureOutcome {
    let CaptureOutcome::Success { provider_id, image } = outcome else {
        return outcome;
    };
    let Some(desktop) = virtual_bounds(monitors) else {
        return CaptureOutcome::failure(provider_id, "no monitors to crop against");
    };
    let Some(visible) = region.intersect(&desktop) else {
        return CaptureOutcome::failure(provider_id, "region lies outside the virtual desktop");
    };

    let local = Region::new(
        visible.x - desktop.x,
        visible.y - desktop.y,
        visible.width,
        visible.height,
    );
    match image.crop_clamped(local) {
        Some(cropped) => CaptureOutcome::success(provider_id, cropped),
        None => CaptureOutcome::failure(provider_id, "region lies outside the captured image"),
    }
}

type StrategyFactory = Box<dyn FnOnce() -> CaptureResult<Option<Arc<dyn CaptureStrategy>>> + Send>;

/// A strategy that may or may not construct on this machine
///
/// The factory returns `Ok(None)` when the mechanism is unsupported and
/// `Err` when construction was attempted and failed.
pub struct StrategyCandidate {
    id:      String,
    stage:   Stage,
    factory: StrategyFactory,
}

impl StrategyCandidate {
    pub fn new<F>(id: impl Into<String>, stage: Stage, factory: F) -> Self
    where
        F: FnOnce() -> CaptureResult<Option<Arc<dyn CaptureStrategy>>> + Send + 'static,
    {
        Self {
            id: id.into(),
            stage,
            factory: Box::new(factory),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}

impl std::fmt::Debug for StrategyCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCandidate")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// The constructed strategy and the trace of how it was chosen
pub struct StrategySelection {
    pub strategy: Arc<dyn CaptureStrategy>,
    pub trace:    DecisionTrace,
}

/// Constructs the first candidate that succeeds
///
/// # Errors
///
/// `BackendNotAvailable { backend }` when every candidate was unsupported or
/// failed to construct.
pub fn select_strategy(
    backend: BackendType,
    candidates: Vec<StrategyCandidate>,
) -> CaptureResult<StrategySelection> {
    let mut walk = ChainWalk::start(format!("{}-strategy", backend.as_str()));

    for candidate in candidates {
        let attempt = match (candidate.factory)() {
            Ok(Some(strategy)) => Attempt::Succeeded(strategy),
            Ok(None) => Attempt::Skipped(UNSUPPORTED_REASON.to_string()),
            Err(e) => Attempt::Failed(Some(e.to_string())),
        };

        if let ControlFlow::Break(done) = walk.step(candidate.stage, &candidate.id, attempt) {
            if let WalkOutcome::Succeeded { provider_id, value } = done {
                tracing::info!("Selected capture strategy {}", provider_id);
                return Ok(StrategySelection {
                    strategy: value,
                    trace:    walk.into_trace(),
                });
            }
            break;
        }
    }

    walk.exhaust::<()>();
    tracing::warn!("No capture strategy available: {}", walk.trace().summary());
    Err(CaptureError::BackendNotAvailable { backend })
}
