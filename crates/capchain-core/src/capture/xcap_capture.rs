//! Direct capture through xcap
//!
//! Shared by the Linux X11 runtime path and the Windows/macOS native
//! strategy. Every function here blocks on the display server; async callers
//! run them in `spawn_blocking` under a timeout via [`run_blocking`].

use std::time::Duration;

use super::image_buffer::ImageBuffer;
use crate::{
    error::{CaptureError, CaptureResult},
    model::{BackendType, MonitorInfo, Region, virtual_bounds},
};

fn xcap_error(backend: BackendType, err: xcap::XCapError) -> CaptureError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("access denied") {
        tracing::warn!("xcap permission denied: {}", message);
        return CaptureError::NotSupported {
            feature: "screen capture permission".to_string(),
            backend,
        };
    }
    CaptureError::ImageError(format!("xcap: {message}"))
}

/// Runs a blocking xcap call on the blocking pool with a bound
pub async fn run_blocking<T, F>(timeout_ms: u64, call: F) -> CaptureResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CaptureResult<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(CaptureError::ImageError(format!("capture task failed: {join}"))),
        Err(_) => {
            tracing::warn!("xcap capture exceeded {}ms", timeout_ms);
            Err(CaptureError::CaptureTimeout {
                duration_ms: timeout_ms,
            })
        }
    }
}

fn monitor_info(monitor: &xcap::Monitor) -> Result<MonitorInfo, xcap::XCapError> {
    let bounds = Region::new(
        monitor.x()?,
        monitor.y()?,
        monitor.width()? as i32,
        monitor.height()? as i32,
    );
    Ok(MonitorInfo {
        id: monitor.id()?.to_string(),
        name: monitor.name()?,
        is_primary: monitor.is_primary()?,
        bounds,
        // xcap does not report panels or docks
        working_area: bounds,
        scale_factor: f64::from(monitor.scale_factor()?),
        rotation: monitor.rotation()?,
        refresh_rate: monitor.frequency()?,
        bits_per_pixel: 32,
    })
}

/// Enumerates monitors; an error or an empty list is reported as an error
pub fn monitors(backend: BackendType) -> CaptureResult<Vec<MonitorInfo>> {
    let monitors = xcap::Monitor::all().map_err(|e| xcap_error(backend, e))?;
    let infos = monitors
        .iter()
        .map(monitor_info)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| xcap_error(backend, e))?;

    if infos.is_empty() {
        return Err(CaptureError::BackendNotAvailable { backend });
    }
    Ok(infos)
}

/// Monitors, or the single default display when enumeration fails
pub fn monitors_or_default(backend: BackendType) -> Vec<MonitorInfo> {
    monitors(backend).unwrap_or_else(|e| {
        tracing::debug!("Monitor enumeration failed ({}); using default display", e);
        vec![MonitorInfo::default_display()]
    })
}

/// Captures every monitor and stitches them into one virtual-desktop image
pub fn capture_virtual_desktop(backend: BackendType) -> CaptureResult<ImageBuffer> {
    let monitors = xcap::Monitor::all().map_err(|e| xcap_error(backend, e))?;

    let mut tiles = Vec::with_capacity(monitors.len());
    let mut infos = Vec::with_capacity(monitors.len());
    for monitor in &monitors {
        let info = monitor_info(monitor).map_err(|e| xcap_error(backend, e))?;
        let image = monitor.capture_image().map_err(|e| xcap_error(backend, e))?;
        tiles.push((info.bounds, ImageBuffer::from_rgba(image)));
        infos.push(info);
    }

    match tiles.len() {
        0 => Err(CaptureError::BackendNotAvailable { backend }),
        1 => Ok(tiles.remove(0).1),
        _ => {
            let bounds = virtual_bounds(&infos).ok_or(CaptureError::BackendNotAvailable { backend })?;
            ImageBuffer::stitch(bounds, &tiles)
        }
    }
}

/// Captures the focused window
///
/// With a window service the foreground window's bounds are cropped out of
/// the virtual desktop. Without one, xcap's focused window is captured.
pub fn capture_active_window(
    backend: BackendType,
    window_bounds: Option<Region>,
) -> CaptureResult<Option<ImageBuffer>> {
    if let Some(bounds) = window_bounds {
        let desktop = capture_virtual_desktop(backend)?;
        let monitors = monitors_or_default(backend);
        let origin = virtual_bounds(&monitors).unwrap_or_default();
        let local = Region::new(bounds.x - origin.x, bounds.y - origin.y, bounds.width, bounds.height);
        return Ok(desktop.crop_clamped(local));
    }

    let windows = xcap::Window::all().map_err(|e| xcap_error(backend, e))?;
    let focused = windows
        .into_iter()
        .find(|w| w.is_focused().unwrap_or(false) && !w.is_minimized().unwrap_or(true));

    match focused {
        Some(window) => {
            let image = window.capture_image().map_err(|e| xcap_error(backend, e))?;
            Ok(Some(ImageBuffer::from_rgba(image)))
        }
        None => {
            tracing::debug!("No focused window reported by xcap");
            Ok(None)
        }
    }
}
