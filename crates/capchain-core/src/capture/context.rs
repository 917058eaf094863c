//! Capture context and request value objects
//!
//! A [`CaptureContext`] is built once per backend from the detector output
//! and the portal probe, then only read. A [`CaptureRequest`] is built once
//! per call. Providers see both and may not mutate either.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{
    CaptureKind, CaptureOptions, DesktopEnvironment, EnvironmentInfo, Region, SessionType,
    WindowHandle,
};

/// Window geometry and identity supplied by the host application
///
/// Window-aware mechanisms (X11 active-window capture, `import -window`)
/// consult it. The chain passes it through untouched.
pub trait WindowService: Send + Sync {
    /// Handle of the currently focused window, if known
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Bounds of a window in virtual-desktop coordinates
    fn window_bounds(&self, handle: WindowHandle) -> Option<Region>;
}

/// Foreground window bounds from a window service, if it knows them
pub fn foreground_bounds(service: Option<&dyn WindowService>) -> Option<Region> {
    let service = service?;
    service.window_bounds(service.foreground_window()?)
}

/// Immutable snapshot of the session a backend was built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureContext {
    pub session:               SessionType,
    pub desktop:               Option<DesktopEnvironment>,
    pub compositor:            String,
    pub sandboxed:             bool,
    /// Whether `org.freedesktop.portal.Screenshot` answered the probe
    pub has_screenshot_portal: bool,
}

impl CaptureContext {
    pub fn new(
        session: SessionType,
        desktop: Option<DesktopEnvironment>,
        compositor: impl Into<String>,
        sandboxed: bool,
        has_screenshot_portal: bool,
    ) -> Self {
        Self {
            session,
            desktop,
            compositor: compositor.into(),
            sandboxed,
            has_screenshot_portal,
        }
    }

    /// Builds a context from detector output plus the portal probe result
    pub fn from_environment(env: &EnvironmentInfo, has_screenshot_portal: bool) -> Self {
        Self::new(
            env.session,
            env.desktop,
            env.compositor.clone(),
            env.sandboxed,
            has_screenshot_portal,
        )
    }

    pub fn is_wayland(&self) -> bool {
        self.session == SessionType::Wayland
    }

    /// Whether the portal is worth trying for this request
    ///
    /// Inside a sandbox the portal is the only viable path. Outside, it needs
    /// to be present and either the session is Wayland (where nothing else is
    /// universally available) or the caller asked for modern capture.
    pub fn should_try_portal(&self, request: &CaptureRequest) -> bool {
        self.sandboxed
            || (self.has_screenshot_portal && (self.is_wayland() || request.use_modern_capture))
    }
}

/// One capture call's intent
///
/// Built once per call and never mutated while the chain is walked.
#[derive(Clone)]
pub struct CaptureRequest {
    pub kind:               CaptureKind,
    pub options:            CaptureOptions,
    /// Allow portal and desktop D-Bus mechanisms
    pub use_modern_capture: bool,
    pub window_service:     Option<Arc<dyn WindowService>>,
}

impl CaptureRequest {
    /// Request with default options and modern capture enabled
    pub fn new(kind: CaptureKind) -> Self {
        Self {
            kind,
            options: CaptureOptions::default(),
            use_modern_capture: true,
            window_service: None,
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_modern_capture(mut self, enabled: bool) -> Self {
        self.use_modern_capture = enabled;
        self
    }

    pub fn with_window_service(mut self, service: Arc<dyn WindowService>) -> Self {
        self.window_service = Some(service);
        self
    }
}

impl std::fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("kind", &self.kind)
            .field("options", &self.options)
            .field("use_modern_capture", &self.use_modern_capture)
            .field("has_window_service", &self.window_service.is_some())
            .finish()
    }
}
