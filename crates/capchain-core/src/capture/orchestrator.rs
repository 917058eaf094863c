//! Provider chain orchestration
//!
//! [`CaptureOrchestrator`] owns an ordered provider list and walks it once per
//! capture call. Providers run strictly one after another: they usually
//! contend for the same display server connection or portal session.
//!
//! # Ordering
//!
//! Providers are sorted by [`Stage`] once, at construction. The sort is
//! stable, so within a stage the registration order is kept. Trial order for
//! an unchanged context is therefore identical across calls.
//!
//! # Stage policy
//!
//! A [`StagePolicy`] decides which stages are enabled for a request. Providers
//! in disabled stages still appear in the trace as `Skipped`.

use std::{ops::ControlFlow, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{
    chain::{Attempt, ChainWalk, Stage, WalkOutcome},
    context::{CaptureContext, CaptureRequest},
    image_buffer::ImageBuffer,
    provider::{CaptureExecution, CaptureOutcome, CaptureProvider, EXHAUSTED_PROVIDER_ID},
};

/// Trace reason for providers whose stage the policy disabled
pub const STAGE_DISABLED_REASON: &str = "stage disabled for context";

/// Trace reason for providers whose `can_handle` returned false
pub const NOT_APPLICABLE_REASON: &str = "not applicable to request/context";

/// Decides which stages may run for a request, in order
pub trait StagePolicy: Send + Sync {
    fn stage_order(&self, request: &CaptureRequest, context: &CaptureContext) -> Vec<Stage>;
}

/// Every stage outside a sandbox, only the portal inside one
#[derive(Debug, Clone, Copy, Default)]
pub struct WaterfallPolicy;

impl StagePolicy for WaterfallPolicy {
    fn stage_order(&self, _request: &CaptureRequest, context: &CaptureContext) -> Vec<Stage> {
        if context.sandboxed {
            vec![Stage::Portal]
        } else {
            Stage::ALL.to_vec()
        }
    }
}

/// Applicability of one provider, computed without running it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderPlan {
    pub provider_id:   String,
    pub stage:         Stage,
    pub stage_enabled: bool,
    pub applicable:    bool,
}

impl ProviderPlan {
    /// Whether the chain would invoke this provider
    pub fn would_run(&self) -> bool {
        self.stage_enabled && self.applicable
    }
}

/// Ordered provider chain with a stage policy
pub struct CaptureOrchestrator {
    providers: Vec<Arc<dyn CaptureProvider>>,
    policy:    Arc<dyn StagePolicy>,
}

impl CaptureOrchestrator {
    /// Builds a chain with the waterfall policy
    pub fn new(providers: Vec<Arc<dyn CaptureProvider>>) -> Self {
        Self::with_policy(providers, Arc::new(WaterfallPolicy))
    }

    pub fn with_policy(
        mut providers: Vec<Arc<dyn CaptureProvider>>,
        policy: Arc<dyn StagePolicy>,
    ) -> Self {
        providers.sort_by_key(|provider| provider.stage());
        Self { providers, policy }
    }

    /// `(id, stage)` pairs in trial order
    pub fn providers(&self) -> Vec<(&str, Stage)> {
        self.providers
            .iter()
            .map(|provider| (provider.id(), provider.stage()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Reports what the chain would do for this request without capturing
    pub fn plan(&self, request: &CaptureRequest, context: &CaptureContext) -> Vec<ProviderPlan> {
        let enabled = self.policy.stage_order(request, context);
        self.providers
            .iter()
            .map(|provider| ProviderPlan {
                provider_id:   provider.id().to_string(),
                stage:         provider.stage(),
                stage_enabled: enabled.contains(&provider.stage()),
                applicable:    provider.can_handle(request, context),
            })
            .collect()
    }

    /// Walks the chain until a provider succeeds, one cancels, or none is left
    pub async fn capture(
        &self,
        request: &CaptureRequest,
        context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureExecution {
        let enabled = self.policy.stage_order(request, context);
        let mut walk = ChainWalk::start(request.kind.as_str());

        for provider in &self.providers {
            let attempt = attempt(provider.as_ref(), &enabled, request, context, cancel).await;
            if let ControlFlow::Break(done) = walk.step(provider.stage(), provider.id(), attempt) {
                return finish(done, walk, self.providers.len());
            }
        }

        let done = walk.exhaust();
        finish(done, walk, self.providers.len())
    }
}

async fn attempt(
    provider: &dyn CaptureProvider,
    enabled: &[Stage],
    request: &CaptureRequest,
    context: &CaptureContext,
    cancel: &CancellationToken,
) -> Attempt<ImageBuffer> {
    if !enabled.contains(&provider.stage()) {
        return Attempt::Skipped(STAGE_DISABLED_REASON.to_string());
    }
    if !provider.can_handle(request, context) {
        return Attempt::Skipped(NOT_APPLICABLE_REASON.to_string());
    }
    if cancel.is_cancelled() {
        return Attempt::Cancelled(Some("cancelled before start".to_string()));
    }

    let call = AssertUnwindSafe(provider.try_capture(request, context, cancel));
    match call.catch_unwind().await {
        Ok(outcome) => outcome.into_attempt(),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("Provider {} panicked: {}", provider.id(), message);
            Attempt::Failed(Some(format!("provider panicked: {message}")))
        }
    }
}

/// Turns a sealed walk into the caller-facing execution
pub(crate) fn finish(
    done: WalkOutcome<ImageBuffer>,
    walk: ChainWalk,
    provider_count: usize,
) -> CaptureExecution {
    let trace = walk.into_trace();
    let outcome = match done {
        WalkOutcome::Succeeded { provider_id, value } => {
            tracing::info!("Captured via {}: {}", provider_id, trace.summary());
            CaptureOutcome::success(provider_id, value)
        }
        WalkOutcome::Cancelled { provider_id } => {
            tracing::warn!("Capture cancelled in {}: {}", provider_id, trace.summary());
            CaptureOutcome::cancelled(provider_id)
        }
        WalkOutcome::Exhausted => {
            tracing::warn!("Capture chain exhausted: {}", trace.summary());
            CaptureOutcome::failure(
                EXHAUSTED_PROVIDER_ID,
                format!("all {provider_count} providers skipped or failed"),
            )
        }
    };

    CaptureExecution { outcome, trace }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
