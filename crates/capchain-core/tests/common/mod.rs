//! Shared fixtures for capchain-core integration tests

#![allow(dead_code)] // Each test binary uses a different subset

use std::sync::Arc;

use capchain_core::{
    capture::{
        CaptureBackend, CaptureContext, ChainConfig, ChainEngine, ImageBuffer,
        mock::MockLinuxRuntime,
    },
    model::{DesktopEnvironment, SessionType},
};

pub fn image(width: u32, height: u32) -> ImageBuffer {
    ImageBuffer::from_test_pattern(width, height)
}

/// X11 session without a portal
pub fn x11_context(desktop: Option<DesktopEnvironment>) -> CaptureContext {
    CaptureContext::new(SessionType::X11, desktop, "X11", false, false)
}

/// Wayland session with the screenshot portal available
pub fn wayland_context(desktop: Option<DesktopEnvironment>) -> CaptureContext {
    CaptureContext::new(SessionType::Wayland, desktop, "WAYLAND", false, true)
}

/// Flatpak-style sandbox on Wayland
pub fn sandboxed_context(desktop: Option<DesktopEnvironment>) -> CaptureContext {
    CaptureContext::new(SessionType::Wayland, desktop, "WAYLAND", true, true)
}

/// Backend over the default Linux chain, keeping a handle on the runtime
pub fn linux_backend(
    runtime: MockLinuxRuntime,
    context: CaptureContext,
) -> (CaptureBackend, Arc<MockLinuxRuntime>) {
    let runtime = Arc::new(runtime);
    let engine = ChainEngine::linux(runtime.clone(), context.clone(), &ChainConfig::default());
    (CaptureBackend::new(Arc::new(engine), context), runtime)
}
