//! KWin screenshot service provider

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

pub const KDE_DBUS_PROVIDER_ID: &str = "kde-dbus";

/// Captures through KWin's `org.kde.KWin.ScreenShot2` interface
///
/// KDE Plasma and LXQt (which commonly runs on KWin) by default. Works on
/// both X11 and Wayland sessions.
pub struct KdeDbusProvider {
    runtime:  Arc<dyn LinuxCaptureRuntime>,
    desktops: Vec<DesktopEnvironment>,
}

impl KdeDbusProvider {
    pub fn new(runtime: Arc<dyn LinuxCaptureRuntime>, desktops: Vec<DesktopEnvironment>) -> Self {
        Self { runtime, desktops }
    }
}

#[async_trait]
impl CaptureProvider for KdeDbusProvider {
    fn id(&self) -> &str {
        KDE_DBUS_PROVIDER_ID
    }

    fn stage(&self) -> Stage {
        Stage::DesktopDbus
    }

    fn can_handle(&self, request: &CaptureRequest, context: &CaptureContext) -> bool {
        !context.sandboxed
            && request.use_modern_capture
            && context.desktop.is_some_and(|d| self.desktops.contains(&d))
    }

    async fn try_capture(
        &self,
        request: &CaptureRequest,
        _context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        guarded(
            KDE_DBUS_PROVIDER_ID,
            cancel,
            self.runtime.try_kde_dbus_capture(request.kind, &request.options),
        )
        .await
    }
}
