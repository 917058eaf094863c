//! Capture provider contract and outcome types
//!
//! A provider wraps one capture mechanism. `can_handle` is a pure predicate
//! over the request and context. `try_capture` never returns an error: every
//! failure becomes a [`CaptureOutcome::Failure`] with a reason, and a user
//! dismissal becomes [`CaptureOutcome::Cancelled`].

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    chain::{Attempt, Stage},
    context::{CaptureContext, CaptureRequest},
    image_buffer::ImageBuffer,
    trace::DecisionTrace,
};
use crate::error::CaptureResult;

/// Provider id reported when every provider was skipped or failed
pub const EXHAUSTED_PROVIDER_ID: &str = "chain-exhausted";

/// Result of one capture attempt, or of a whole chain walk
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Bitmap produced; ownership moves to the caller
    Success {
        provider_id: String,
        image:       ImageBuffer,
    },
    /// User dismissed the capture, or the caller's token fired
    Cancelled { provider_id: String },
    /// No bitmap; `reason` is for the trace only
    Failure {
        provider_id: String,
        reason:      Option<String>,
    },
}

impl CaptureOutcome {
    pub fn success(provider_id: impl Into<String>, image: ImageBuffer) -> Self {
        Self::Success {
            provider_id: provider_id.into(),
            image,
        }
    }

    pub fn cancelled(provider_id: impl Into<String>) -> Self {
        Self::Cancelled {
            provider_id: provider_id.into(),
        }
    }

    pub fn failure(provider_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failure {
            provider_id: provider_id.into(),
            reason:      Some(reason.into()),
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            Self::Success { provider_id, .. }
            | Self::Cancelled { provider_id }
            | Self::Failure { provider_id, .. } => provider_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn image(&self) -> Option<&ImageBuffer> {
        match self {
            Self::Success { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<ImageBuffer> {
        match self {
            Self::Success { image, .. } => Some(image),
            _ => None,
        }
    }

    /// The chain step this outcome represents
    pub fn into_attempt(self) -> Attempt<ImageBuffer> {
        match self {
            Self::Success { image, .. } => Attempt::Succeeded(image),
            Self::Cancelled { .. } => Attempt::Cancelled(None),
            Self::Failure { reason, .. } => Attempt::Failed(reason),
        }
    }

    /// Converts a runtime result into an outcome
    ///
    /// `Ok(None)` means the mechanism ran but produced nothing.
    pub fn from_runtime(provider_id: &str, result: CaptureResult<Option<ImageBuffer>>) -> Self {
        match result {
            Ok(Some(image)) => Self::success(provider_id, image),
            Ok(None) => Self::failure(provider_id, "no image returned"),
            Err(err) if err.is_user_cancellation() => Self::cancelled(provider_id),
            Err(err) => Self::failure(provider_id, err.to_string()),
        }
    }
}

/// Outcome of a capture call plus the trace explaining it
#[derive(Debug, Clone)]
pub struct CaptureExecution {
    pub outcome: CaptureOutcome,
    pub trace:   DecisionTrace,
}

impl CaptureExecution {
    pub fn into_image(self) -> Option<ImageBuffer> {
        self.outcome.into_image()
    }
}

/// One capture mechanism in a provider chain
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Stable lowercase hyphenated id used in traces and logs
    fn id(&self) -> &str;

    fn stage(&self) -> Stage;

    /// Whether this provider applies; must not perform I/O
    fn can_handle(&self, request: &CaptureRequest, context: &CaptureContext) -> bool;

    /// Runs the capture; never panics on native errors and never returns `Err`
    async fn try_capture(
        &self,
        request: &CaptureRequest,
        context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome;
}

/// Races a runtime call against the caller's token
///
/// Cancellation wins ties, so a token that is already cancelled never starts
/// the native wait. Dropping the runtime future kills any tool process group
/// it spawned and releases its temp file guard.
pub async fn guarded<F>(provider_id: &str, cancel: &CancellationToken, call: F) -> CaptureOutcome
where
    F: Future<Output = CaptureResult<Option<ImageBuffer>>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("{} abandoned: caller cancelled", provider_id);
            CaptureOutcome::cancelled(provider_id)
        }
        result = call => CaptureOutcome::from_runtime(provider_id, result),
    }
}
