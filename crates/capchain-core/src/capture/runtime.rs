//! Linux capture runtime seam
//!
//! Providers never talk to the OS themselves. Each one asks a
//! [`LinuxCaptureRuntime`] for a single native operation and turns the
//! answer into an outcome. The native implementation lives in
//! `linux_runtime`; tests use [`MockLinuxRuntime`](super::mock::MockLinuxRuntime).

use async_trait::async_trait;

use super::{context::WindowService, image_buffer::ImageBuffer};
use crate::{
    error::CaptureResult,
    model::{CaptureKind, CaptureOptions, DesktopEnvironment, MonitorInfo},
};

/// Portal reply: an image when the request succeeded, plus the raw response
/// code the portal sent
#[derive(Debug, Clone)]
pub struct PortalResponse {
    pub image:    Option<ImageBuffer>,
    pub response: u32,
}

impl PortalResponse {
    pub fn success(image: ImageBuffer) -> Self {
        Self {
            image:    Some(image),
            response: 0,
        }
    }

    pub fn empty(response: u32) -> Self {
        Self {
            image: None,
            response,
        }
    }
}

/// Native capture operations used by the Linux providers
///
/// Every method returns `Ok(None)` when the mechanism ran but produced no
/// bitmap, and `Err(CaptureError::UserCancelled)` when the user dismissed it.
#[async_trait]
pub trait LinuxCaptureRuntime: Send + Sync {
    /// Response code the portal uses for "user cancelled"
    fn portal_cancelled_response_code(&self) -> u32;

    async fn try_portal_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<PortalResponse>;

    async fn try_gnome_dbus_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>>;

    async fn try_kde_dbus_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>>;

    async fn try_wlroots_capture(
        &self,
        kind: CaptureKind,
        desktop: Option<DesktopEnvironment>,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>>;

    async fn try_x11_capture(
        &self,
        kind: CaptureKind,
        window_service: Option<&dyn WindowService>,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>>;

    async fn try_cli_capture(
        &self,
        kind: CaptureKind,
        desktop: Option<DesktopEnvironment>,
        window_service: Option<&dyn WindowService>,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>>;

    /// Monitor layout; never empty
    async fn monitors(&self) -> Vec<MonitorInfo>;
}
