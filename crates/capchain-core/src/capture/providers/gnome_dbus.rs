//! GNOME Shell screenshot service provider

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

pub const GNOME_DBUS_PROVIDER_ID: &str = "gnome-dbus";

/// Captures through `org.gnome.Shell.Screenshot`
///
/// Serves GNOME and the desktops built on its shell components (MATE and
/// Cinnamon by default).
pub struct GnomeDbusProvider {
    runtime:  Arc<dyn LinuxCaptureRuntime>,
    desktops: Vec<DesktopEnvironment>,
}

impl GnomeDbusProvider {
    pub fn new(runtime: Arc<dyn LinuxCaptureRuntime>, desktops: Vec<DesktopEnvironment>) -> Self {
        Self { runtime, desktops }
    }
}

#[async_trait]
impl CaptureProvider for GnomeDbusProvider {
    fn id(&self) -> &str {
        GNOME_DBUS_PROVIDER_ID
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
            GNOME_DBUS_PROVIDER_ID,
            cancel,
            self.runtime.try_gnome_dbus_capture(request.kind, &request.options),
        )
        .await
    }
}
