//! Native Linux capture runtime
//!
//! Implements [`LinuxCaptureRuntime`] against the real desktop:
//!
//! - portal: `org.freedesktop.portal.Screenshot` through ashpd
//! - GNOME: `org.gnome.Shell.Screenshot` through a zbus proxy
//! - KDE: `org.kde.KWin.ScreenShot2`, raw pixels written into a temp file fd
//! - wlroots: grimblast, hyprshot, slurp and grim through the CLI runner
//! - X11: xcap on the blocking pool
//! - CLI: the desktop tool table through the CLI runner

use std::{collections::HashMap, os::fd::OwnedFd, path::Path, time::Duration};

use ashpd::desktop::{ResponseError, screenshot::Screenshot};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use zbus::zvariant::{Fd, OwnedValue, Value};

use super::{
    cli_runner::{
        CliToolRunner, grim_invocation, hyprland_tool_candidates, linux_tool_candidates,
    },
    config::ChainConfig,
    constants,
    context::{CaptureContext, WindowService, foreground_bounds},
    image_buffer::ImageBuffer,
    providers::{GNOME_DBUS_PROVIDER_ID, KDE_DBUS_PROVIDER_ID, PORTAL_PROVIDER_ID},
    qimage::{self, RawLayout},
    runtime::{LinuxCaptureRuntime, PortalResponse},
    xcap_capture,
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{BackendType, CaptureKind, CaptureOptions, DesktopEnvironment, MonitorInfo},
    util::temp_files::TempCapturePath,
};

/// Portal response codes
pub const PORTAL_RESPONSE_SUCCESS: u32 = 0;
pub const PORTAL_RESPONSE_CANCELLED: u32 = 1;
pub const PORTAL_RESPONSE_OTHER: u32 = 2;

const PORTAL_SERVICE: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const PORTAL_SCREENSHOT_INTERFACE: &str = "org.freedesktop.portal.Screenshot";
const GNOME_SERVICE: &str = "org.gnome.Shell.Screenshot";
const KWIN_SERVICE: &str = "org.kde.KWin.ScreenShot2";

/// `CaptureInteractive` kind selecting a screen area
const KWIN_INTERACTIVE_SCREEN: u32 = 1;

#[zbus::proxy(
    interface = "org.gnome.Shell.Screenshot",
    default_service = "org.gnome.Shell.Screenshot",
    default_path = "/org/gnome/Shell/Screenshot"
)]
trait GnomeShellScreenshot {
    fn screenshot(
        &self,
        include_cursor: bool,
        flash: bool,
        filename: &str,
    ) -> zbus::Result<(bool, String)>;

    fn screenshot_window(
        &self,
        include_frame: bool,
        include_cursor: bool,
        flash: bool,
        filename: &str,
    ) -> zbus::Result<(bool, String)>;

    fn screenshot_area(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        flash: bool,
        filename: &str,
    ) -> zbus::Result<(bool, String)>;

    fn select_area(&self) -> zbus::Result<(i32, i32, i32, i32)>;
}

#[zbus::proxy(
    interface = "org.kde.KWin.ScreenShot2",
    default_service = "org.kde.KWin.ScreenShot2",
    default_path = "/org/kde/KWin/ScreenShot2"
)]
trait KWinScreenShot2 {
    fn capture_workspace(
        &self,
        options: HashMap<&str, &Value<'_>>,
        pipe: Fd<'_>,
    ) -> zbus::Result<HashMap<String, OwnedValue>>;

    fn capture_active_window(
        &self,
        options: HashMap<&str, &Value<'_>>,
        pipe: Fd<'_>,
    ) -> zbus::Result<HashMap<String, OwnedValue>>;

    fn capture_interactive(
        &self,
        kind: u32,
        options: HashMap<&str, &Value<'_>>,
        pipe: Fd<'_>,
    ) -> zbus::Result<HashMap<String, OwnedValue>>;
}

/// Maps a bus error, treating anything that mentions cancellation as the
/// user dismissing the capture
fn bus_error(service: &str, provider: &str, err: zbus::Error) -> CaptureError {
    let reason = err.to_string();
    if reason.to_lowercase().contains("cancel") {
        return CaptureError::UserCancelled {
            provider: provider.to_string(),
        };
    }
    CaptureError::DbusError {
        service: service.to_string(),
        reason,
    }
}

async fn bounded<T, F>(timeout_ms: u64, call: F) -> CaptureResult<T>
where
    F: std::future::Future<Output = CaptureResult<T>>,
{
    tokio::time::timeout(Duration::from_millis(timeout_ms), call)
        .await
        .map_err(|_| CaptureError::CaptureTimeout {
            duration_ms: timeout_ms,
        })?
}

/// Interactive D-Bus calls wait on the user and get the portal bound
fn dbus_bound(kind: CaptureKind) -> u64 {
    if kind.is_interactive() {
        constants::portal_timeout_ms()
    } else {
        constants::dbus_timeout_ms()
    }
}

fn metadata_u32(metadata: &HashMap<String, OwnedValue>, key: &str) -> Option<u32> {
    metadata.get(key).and_then(|v| v.downcast_ref::<u32>().ok())
}

/// Real desktop capture for Linux sessions
pub struct NativeLinuxRuntime {
    runner:  CliToolRunner,
    wayland: bool,
    bus:     OnceCell<zbus::Connection>,
}

impl NativeLinuxRuntime {
    pub fn new(config: &ChainConfig, context: &CaptureContext) -> Self {
        Self {
            runner:  CliToolRunner::from_config(config),
            wayland: context.is_wayland(),
            bus:     OnceCell::new(),
        }
    }

    async fn session_bus(&self, service: &str) -> CaptureResult<&zbus::Connection> {
        self.bus
            .get_or_try_init(zbus::Connection::session)
            .await
            .map_err(|e| CaptureError::DbusError {
                service: service.to_string(),
                reason:  format!("session bus unavailable: {e}"),
            })
    }

    async fn portal_request(&self, kind: CaptureKind) -> CaptureResult<PortalResponse> {
        let reply = Screenshot::request()
            .interactive(kind != CaptureKind::FullScreen)
            .modal(true)
            .send()
            .await
            .and_then(|request| request.response());

        let screenshot = match reply {
            Ok(screenshot) => screenshot,
            Err(ashpd::Error::Response(ResponseError::Cancelled)) => {
                return Ok(PortalResponse::empty(PORTAL_RESPONSE_CANCELLED));
            }
            Err(ashpd::Error::PortalNotFound(_)) => {
                return Err(CaptureError::PortalUnavailable {
                    portal: PORTAL_SCREENSHOT_INTERFACE.to_string(),
                });
            }
            Err(e) => {
                tracing::debug!("Portal screenshot request failed: {}", e);
                return Ok(PortalResponse::empty(PORTAL_RESPONSE_OTHER));
            }
        };

        let path = screenshot.uri().to_file_path().map_err(|_| {
            CaptureError::ImageError(format!("portal returned non-file uri {}", screenshot.uri()))
        })?;
        let image = ImageBuffer::load(&path)?;
        Ok(PortalResponse::success(image))
    }

    async fn gnome_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        let bus = self.session_bus(GNOME_SERVICE).await?;
        let proxy = GnomeShellScreenshotProxy::new(bus)
            .await
            .map_err(|e| bus_error(GNOME_SERVICE, GNOME_DBUS_PROVIDER_ID, e))?;
        let output = TempCapturePath::new_in(self.runner.temp_root(), "png")?;
        let filename = output.path().to_string_lossy().into_owned();

        let reply = match kind {
            CaptureKind::FullScreen => proxy.screenshot(options.show_cursor, false, &filename).await,
            CaptureKind::ActiveWindow => {
                proxy
                    .screenshot_window(true, options.show_cursor, false, &filename)
                    .await
            }
            CaptureKind::Region => {
                let (x, y, width, height) = proxy
                    .select_area()
                    .await
                    .map_err(|e| bus_error(GNOME_SERVICE, GNOME_DBUS_PROVIDER_ID, e))?;
                proxy
                    .screenshot_area(x, y, width, height, false, &filename)
                    .await
            }
        };

        let (ok, _written) = reply.map_err(|e| bus_error(GNOME_SERVICE, GNOME_DBUS_PROVIDER_ID, e))?;
        if !ok || !output.exists() {
            return Ok(None);
        }
        ImageBuffer::load(output.path()).map(Some)
    }

    async fn kde_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        let bus = self.session_bus(KWIN_SERVICE).await?;
        let proxy = KWinScreenShot2Proxy::new(bus)
            .await
            .map_err(|e| bus_error(KWIN_SERVICE, KDE_DBUS_PROVIDER_ID, e))?;

        let raw = TempCapturePath::new_in(self.runner.temp_root(), "raw")?;
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(raw.path())?;
        let pipe = Fd::from(OwnedFd::from(file.try_clone()?));

        let include_cursor = Value::Bool(options.show_cursor);
        let include_decoration = Value::Bool(options.include_window_frame);
        let native_resolution = Value::Bool(true);
        let mut kwin_options: HashMap<&str, &Value<'_>> = HashMap::new();
        kwin_options.insert("include-cursor", &include_cursor);
        kwin_options.insert("include-decoration", &include_decoration);
        kwin_options.insert("native-resolution", &native_resolution);

        let reply = match kind {
            CaptureKind::FullScreen => proxy.capture_workspace(kwin_options, pipe).await,
            CaptureKind::ActiveWindow => proxy.capture_active_window(kwin_options, pipe).await,
            CaptureKind::Region => {
                proxy
                    .capture_interactive(KWIN_INTERACTIVE_SCREEN, kwin_options, pipe)
                    .await
            }
        };
        let metadata = reply.map_err(|e| bus_error(KWIN_SERVICE, KDE_DBUS_PROVIDER_ID, e))?;
        drop(file);

        let (Some(width), Some(height), Some(format)) = (
            metadata_u32(&metadata, "width"),
            metadata_u32(&metadata, "height"),
            metadata_u32(&metadata, "format"),
        ) else {
            return Err(CaptureError::DbusError {
                service: KWIN_SERVICE.to_string(),
                reason:  "reply is missing width, height or format".to_string(),
            });
        };
        let layout = RawLayout {
            width,
            height,
            stride: metadata_u32(&metadata, "stride").unwrap_or(width * 4),
            format,
        };

        wait_for_len(raw.path(), layout.expected_len()).await?;
        let bytes = tokio::fs::read(raw.path()).await?;
        qimage::decode(&bytes, layout).map(Some)
    }

    async fn wlroots_capture(
        &self,
        kind: CaptureKind,
        desktop: Option<DesktopEnvironment>,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        if kind == CaptureKind::FullScreen {
            return self.runner.run(&grim_invocation(None, options)).await.map(Some);
        }

        if desktop == Some(DesktopEnvironment::Hyprland) {
            match self.runner.run_first(&hyprland_tool_candidates(kind)).await {
                Ok(image) => return Ok(Some(image)),
                Err(e) => tracing::debug!("Hyprland tools failed ({}); trying grim + slurp", e),
            }
        }

        let geometry = self.runner.stdout_of("slurp", &[], true).await?;
        self.runner
            .run(&grim_invocation(Some(&geometry), options))
            .await
            .map(Some)
    }
}

/// Waits until KWin has written `expected` bytes
async fn wait_for_len(path: &Path, expected: u64) -> CaptureResult<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(constants::KWIN_WRITE_TIMEOUT_MS);
    loop {
        let len = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        if len >= expected {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CaptureError::CaptureTimeout {
                duration_ms: constants::KWIN_WRITE_TIMEOUT_MS,
            });
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[async_trait]
impl LinuxCaptureRuntime for NativeLinuxRuntime {
    fn portal_cancelled_response_code(&self) -> u32 {
        PORTAL_RESPONSE_CANCELLED
    }

    async fn try_portal_capture(
        &self,
        kind: CaptureKind,
        _options: &CaptureOptions,
    ) -> CaptureResult<PortalResponse> {
        tracing::debug!("{}: requesting {} screenshot", PORTAL_PROVIDER_ID, kind.as_str());
        bounded(constants::portal_timeout_ms(), self.portal_request(kind)).await
    }

    async fn try_gnome_dbus_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        bounded(dbus_bound(kind), self.gnome_capture(kind, options)).await
    }

    async fn try_kde_dbus_capture(
        &self,
        kind: CaptureKind,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        bounded(dbus_bound(kind), self.kde_capture(kind, options)).await
    }

    async fn try_wlroots_capture(
        &self,
        kind: CaptureKind,
        desktop: Option<DesktopEnvironment>,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        self.wlroots_capture(kind, desktop, options).await
    }

    async fn try_x11_capture(
        &self,
        kind: CaptureKind,
        window_service: Option<&dyn WindowService>,
        _options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        let window_bounds = match kind {
            CaptureKind::ActiveWindow => foreground_bounds(window_service),
            CaptureKind::FullScreen | CaptureKind::Region => None,
        };

        xcap_capture::run_blocking(constants::x11_capture_timeout_ms(), move || match kind {
            CaptureKind::ActiveWindow => {
                xcap_capture::capture_active_window(BackendType::X11, window_bounds)
            }
            // Region selection happens in the caller's overlay
            CaptureKind::FullScreen | CaptureKind::Region => {
                xcap_capture::capture_virtual_desktop(BackendType::X11).map(Some)
            }
        })
        .await
    }

    async fn try_cli_capture(
        &self,
        kind: CaptureKind,
        desktop: Option<DesktopEnvironment>,
        window_service: Option<&dyn WindowService>,
        options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        let candidates = linux_tool_candidates(kind, desktop, self.wayland, window_service, options);
        self.runner.run_first(&candidates).await.map(Some)
    }

    async fn monitors(&self) -> Vec<MonitorInfo> {
        let backend = if self.wayland {
            BackendType::Wayland
        } else {
            BackendType::X11
        };
        xcap_capture::run_blocking(constants::x11_capture_timeout_ms(), move || {
            Ok(xcap_capture::monitors_or_default(backend))
        })
        .await
        .unwrap_or_else(|_| vec![MonitorInfo::default_display()])
    }
}

// =============================================================================
// Portal probe
// =============================================================================

async fn introspect_portal() -> zbus::Result<String> {
    let connection = zbus::Connection::session().await?;
    let proxy = zbus::fdo::IntrospectableProxy::builder(&connection)
        .destination(PORTAL_SERVICE)?
        .path(PORTAL_PATH)?
        .build()
        .await?;
    Ok(proxy.introspect().await?)
}

async fn introspect_portal_with_busctl() -> CaptureResult<String> {
    let output = tokio::time::timeout(
        Duration::from_millis(constants::dbus_timeout_ms()),
        tokio::process::Command::new("busctl")
            .args(["--user", "introspect", PORTAL_SERVICE, PORTAL_PATH])
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| CaptureError::CaptureTimeout {
        duration_ms: constants::dbus_timeout_ms(),
    })??;

    if !output.status.success() {
        return Err(CaptureError::ToolFailed {
            tool:      "busctl".to_string(),
            exit_code: output.status.code(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether the session exposes `org.freedesktop.portal.Screenshot`
pub async fn probe_screenshot_portal() -> bool {
    let listing = match introspect_portal().await {
        Ok(xml) => Ok(xml),
        Err(e) => {
            tracing::debug!("Portal introspection over D-Bus failed ({}); trying busctl", e);
            introspect_portal_with_busctl().await
        }
    };

    match listing {
        Ok(text) => {
            let present = text.contains(PORTAL_SCREENSHOT_INTERFACE);
            tracing::debug!("Screenshot portal present: {}", present);
            present
        }
        Err(e) => {
            tracing::debug!("Portal probe failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_errors_map_to_user_cancelled() {
        let err = bus_error(
            KWIN_SERVICE,
            KDE_DBUS_PROVIDER_ID,
            zbus::Error::Failure("org.kde.KWin.ScreenShot2.Error.Cancelled".to_string()),
        );
        assert!(err.is_user_cancellation());

        let err = bus_error(
            GNOME_SERVICE,
            GNOME_DBUS_PROVIDER_ID,
            zbus::Error::Failure("Operation was cancelled".to_string()),
        );
        assert!(err.is_user_cancellation());
    }

    #[test]
    fn test_other_errors_are_dbus_errors() {
        let err = bus_error(
            GNOME_SERVICE,
            GNOME_DBUS_PROVIDER_ID,
            zbus::Error::Failure("AccessDenied".to_string()),
        );
        assert!(matches!(err, CaptureError::DbusError { ref service, .. } if service == GNOME_SERVICE));
    }

    #[test]
    fn test_interactive_kinds_get_longer_bound() {
        temp_env::with_vars_unset(["CAPCHAIN_PORTAL_TIMEOUT_SECS", "CAPCHAIN_DBUS_TIMEOUT_MS"], || {
            assert!(dbus_bound(CaptureKind::Region) > dbus_bound(CaptureKind::FullScreen));
        });
    }

    #[tokio::test]
    async fn test_wait_for_len_returns_once_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        std::fs::write(&path, [0u8; 16]).unwrap();

        assert!(wait_for_len(&path, 16).await.is_ok());
    }
}
