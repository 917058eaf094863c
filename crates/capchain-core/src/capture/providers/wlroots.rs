//! wlroots compositor provider (Hyprland, Sway)

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{
        chain::Stage,
        context::{CaptureContext, CaptureRequest},
        provider::{CaptureOutcome, CaptureProvider, guarded},
        runtime::LinuxCaptureRuntime,
    },
    model::DesktopEnvironment,
};

pub const WLROOTS_PROVIDER_ID: &str = "wlroots";

/// Drives grim-family tools on compositors that expose wlr-screencopy
pub struct WlrootsProvider {
    runtime:  Arc<dyn LinuxCaptureRuntime>,
    desktops: Vec<DesktopEnvironment>,
}

impl WlrootsProvider {
    pub fn new(runtime: Arc<dyn LinuxCaptureRuntime>, desktops: Vec<DesktopEnvironment>) -> Self {
        Self { runtime, desktops }
    }
}

#[async_trait]
impl CaptureProvider for WlrootsProvider {
    fn id(&self) -> &str {
        WLROOTS_PROVIDER_ID
    }

    fn stage(&self) -> Stage {
        Stage::WaylandProtocol
    }

    fn can_handle(&self, _request: &CaptureRequest, context: &CaptureContext) -> bool {
        context.is_wayland()
            && !context.sandboxed
            && context.desktop.is_some_and(|d| self.desktops.contains(&d))
    }

    async fn try_capture(
        &self,
        request: &CaptureRequest,
        context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        guarded(
            WLROOTS_PROVIDER_ID,
            cancel,
            self.runtime
                .try_wlroots_capture(request.kind, context.desktop, &request.options),
        )
        .await
    }
}
