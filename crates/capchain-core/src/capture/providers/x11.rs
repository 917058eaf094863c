//! Direct X11 capture provider

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capture::{
    chain::Stage,
    context::{CaptureContext, CaptureRequest},
    provider::{CaptureOutcome, CaptureProvider, guarded},
    runtime::LinuxCaptureRuntime,
};

pub const X11_PROVIDER_ID: &str = "x11";

/// Reads pixels straight from the X server
///
/// The non-portal baseline on X11 sessions. Window-aware: the request's
/// window service, when present, is handed to the runtime untouched.
pub struct X11Provider {
    runtime: Arc<dyn LinuxCaptureRuntime>,
}

impl X11Provider {
    pub fn new(runtime: Arc<dyn LinuxCaptureRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl CaptureProvider for X11Provider {
    fn id(&self) -> &str {
        X11_PROVIDER_ID
    }

    fn stage(&self) -> Stage {
        Stage::Native
    }

    fn can_handle(&self, _request: &CaptureRequest, context: &CaptureContext) -> bool {
        !context.is_wayland() && !context.sandboxed
    }

    async fn try_capture(
        &self,
        request: &CaptureRequest,
        _context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        guarded(
            X11_PROVIDER_ID,
            cancel,
            self.runtime.try_x11_capture(
                request.kind,
                request.window_service.as_deref(),
                &request.options,
            ),
        )
        .await
    }
}
