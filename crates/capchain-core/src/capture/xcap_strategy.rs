//! Native Windows/macOS capture through xcap
//!
//! Construction enumerates monitors once: no monitors means the strategy is
//! unsupported here, an xcap error means construction failed. Either way
//! selection falls through to the CLI strategy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{
    chain::Stage,
    constants,
    context::{CaptureRequest, foreground_bounds},
    provider::{CaptureOutcome, guarded},
    strategy::{CONFIGURATION_CHANNEL_CAPACITY, CaptureStrategy},
    xcap_capture,
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{
        BackendCapabilities, BackendType, CaptureKind, ConfigurationChanged, MAX_CAPTURE_RESOLUTION,
        MonitorInfo,
    },
};

pub const XCAP_STRATEGY_ID: &str = "xcap-native";

/// Direct capture via the platform API xcap wraps
#[derive(Debug)]
pub struct XcapStrategy {
    backend: BackendType,
    events:  broadcast::Sender<ConfigurationChanged>,
}

impl XcapStrategy {
    /// Builds the strategy if xcap can see a display
    ///
    /// # Errors
    ///
    /// Whatever xcap reported while enumerating, e.g. a missing screen
    /// recording permission on macOS.
    pub fn probe(backend: BackendType) -> CaptureResult<Option<Arc<dyn CaptureStrategy>>> {
        match xcap_capture::monitors(backend) {
            Ok(monitors) => {
                tracing::debug!("xcap sees {} monitor(s)", monitors.len());
                let (events, _) = broadcast::channel(CONFIGURATION_CHANNEL_CAPACITY);
                Ok(Some(Arc::new(Self { backend, events })))
            }
            Err(CaptureError::BackendNotAvailable { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CaptureStrategy for XcapStrategy {
    fn id(&self) -> &str {
        XCAP_STRATEGY_ID
    }

    fn stage(&self) -> Stage {
        Stage::Native
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            backend_name:                   format!("xcap ({})", self.backend.as_str()),
            version:                        env!("CARGO_PKG_VERSION").to_string(),
            supports_hardware_acceleration: cfg!(target_os = "windows"),
            supports_cursor_capture:        false,
            supports_hdr:                   false,
            supports_per_monitor_dpi:       true,
            supports_monitor_hotplug:       true,
            max_capture_resolution:         MAX_CAPTURE_RESOLUTION,
            requires_permission:            cfg!(target_os = "macos"),
        }
    }

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        let backend = self.backend;
        xcap_capture::run_blocking(constants::x11_capture_timeout_ms(), move || {
            xcap_capture::monitors(backend)
        })
        .await
    }

    async fn capture(&self, request: &CaptureRequest, cancel: &CancellationToken) -> CaptureOutcome {
        let backend = self.backend;
        let kind = request.kind;
        let window_bounds = foreground_bounds(request.window_service.as_deref());

        // The X11 bound also covers xcap on the other platforms
        let call = xcap_capture::run_blocking(constants::x11_capture_timeout_ms(), move || match kind {
            CaptureKind::ActiveWindow => xcap_capture::capture_active_window(backend, window_bounds),
            CaptureKind::FullScreen | CaptureKind::Region => {
                xcap_capture::capture_virtual_desktop(backend).map(Some)
            }
        });
        guarded(XCAP_STRATEGY_ID, cancel, call).await
    }

    fn configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.events.subscribe()
    }
}
