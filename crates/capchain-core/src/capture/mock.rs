//! Mock building blocks for testing chains without a desktop
//!
//! - [`MockProvider`]: a provider with a scripted outcome, call counting, and
//!   optional delay
//! - [`MockLinuxRuntime`]: a scripted [`LinuxCaptureRuntime`] for exercising
//!   the real Linux providers
//! - [`MockStrategy`]: a scripted [`CaptureStrategy`] for facade and
//!   selection tests
//! - [`MockWindowService`]: a fixed foreground window
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use capchain_core::{
//!     capture::{
//!         CaptureContext, CaptureOrchestrator, CaptureRequest, Stage, mock::MockProvider,
//!     },
//!     model::{CaptureKind, SessionType},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let chain = CaptureOrchestrator::new(vec![
//!         Arc::new(MockProvider::failing("x11", Stage::Native)),
//!         Arc::new(MockProvider::succeeding("cli", Stage::CliFallback, 64, 32)),
//!     ]);
//!     let context = CaptureContext::new(SessionType::X11, None, "X11", false, false);
//!
//!     let execution = chain
//!         .capture(&CaptureRequest::new(CaptureKind::FullScreen), &context, &CancellationToken::new())
//!         .await;
//!     assert_eq!(execution.outcome.provider_id(), "cli");
//!     assert_eq!(execution.trace.summary(), "x11:failed -> cli:succeeded");
//! }
//! ```

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{
    chain::Stage,
    context::{CaptureContext, CaptureRequest, WindowService},
    image_buffer::ImageBuffer,
    provider::{CaptureOutcome, CaptureProvider, guarded},
    runtime::{LinuxCaptureRuntime, PortalResponse},
    strategy::{CONFIGURATION_CHANNEL_CAPACITY, CaptureStrategy},
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{
        BackendCapabilities, CaptureKind, CaptureOptions, ConfigurationChanged, DesktopEnvironment,
        MonitorInfo, Region, WindowHandle,
    },
};

// =============================================================================
// MockProvider
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Fail,
    Succeed(u32, u32),
    Cancel,
    Panic,
}

/// Provider with a fixed outcome
#[derive(Debug)]
pub struct MockProvider {
    id:         String,
    stage:      Stage,
    script:     Scripted,
    applicable: bool,
    delay:      Option<Duration>,
    calls:      AtomicUsize,
}

impl MockProvider {
    fn scripted(id: &str, stage: Stage, script: Scripted) -> Self {
        Self {
            id: id.to_string(),
            stage,
            script,
            applicable: true,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: &str, stage: Stage) -> Self {
        Self::scripted(id, stage, Scripted::Fail)
    }

    /// Succeeds with a `width` x `height` test pattern
    pub fn succeeding(id: &str, stage: Stage, width: u32, height: u32) -> Self {
        Self::scripted(id, stage, Scripted::Succeed(width, height))
    }

    /// Behaves as if the user dismissed the capture dialog
    pub fn cancelling(id: &str, stage: Stage) -> Self {
        Self::scripted(id, stage, Scripted::Cancel)
    }

    pub fn panicking(id: &str, stage: Stage) -> Self {
        Self::scripted(id, stage, Scripted::Panic)
    }

    /// Makes `can_handle` return false
    pub fn not_applicable(mut self) -> Self {
        self.applicable = false;
        self
    }

    /// Waits `delay` before answering; the caller's token cuts it short
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `try_capture` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn can_handle(&self, _request: &CaptureRequest, _context: &CaptureContext) -> bool {
        self.applicable
    }

    async fn try_capture(
        &self,
        _request: &CaptureRequest,
        _context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return CaptureOutcome::cancelled(&self.id),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match self.script {
            Scripted::Fail => CaptureOutcome::failure(&self.id, "mock failure"),
            Scripted::Succeed(width, height) => {
                CaptureOutcome::success(&self.id, ImageBuffer::from_test_pattern(width, height))
            }
            Scripted::Cancel => CaptureOutcome::cancelled(&self.id),
            Scripted::Panic => panic!("mock provider {} exploded", self.id),
        }
    }
}

// =============================================================================
// MockReply
// =============================================================================

/// Scripted answer for one runtime operation
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Returns the image
    Image(ImageBuffer),
    /// Ran but produced no bitmap
    Nothing,
    /// The user dismissed the capture
    UserCancelled,
    /// A bus error with this message
    Error(String),
    /// Any other error, built fresh per call
    Fail(fn() -> CaptureError),
    /// Never answers
    Hang,
}

impl MockReply {
    async fn resolve(self, operation: &str) -> CaptureResult<Option<ImageBuffer>> {
        match self {
            Self::Image(image) => Ok(Some(image)),
            Self::Nothing => Ok(None),
            Self::UserCancelled => Err(CaptureError::UserCancelled {
                provider: operation.to_string(),
            }),
            Self::Error(reason) => Err(CaptureError::DbusError {
                service: "mock".to_string(),
                reason,
            }),
            Self::Fail(make) => Err(make()),
            Self::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// MockLinuxRuntime
// =============================================================================

/// Scripted Linux runtime
///
/// Defaults: the portal answers response code 2 with no image, every other
/// operation runs and produces nothing, the cancel code is 1.
#[derive(Debug)]
pub struct MockLinuxRuntime {
    portal:      PortalResponse,
    cancel_code: u32,
    gnome:       MockReply,
    kde:         MockReply,
    wlroots:     MockReply,
    x11:         MockReply,
    cli:         MockReply,
    monitors:    Vec<MonitorInfo>,
    calls:       Mutex<Vec<(&'static str, bool)>>,
}

impl Default for MockLinuxRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLinuxRuntime {
    pub fn new() -> Self {
        Self {
            portal:      PortalResponse::empty(2),
            cancel_code: 1,
            gnome:       MockReply::Nothing,
            kde:         MockReply::Nothing,
            wlroots:     MockReply::Nothing,
            x11:         MockReply::Nothing,
            cli:         MockReply::Nothing,
            monitors:    vec![MonitorInfo::default_display()],
            calls:       Mutex::new(Vec::new()),
        }
    }

    pub fn with_portal(mut self, response: PortalResponse) -> Self {
        self.portal = response;
        self
    }

    pub fn with_portal_cancel_code(mut self, code: u32) -> Self {
        self.cancel_code = code;
        self
    }

    pub fn with_gnome(mut self, reply: MockReply) -> Self {
        self.gnome = reply;
        self
    }

    pub fn with_kde(mut self, reply: MockReply) -> Self {
        self.kde = reply;
        self
    }

    pub fn with_wlroots(mut self, reply: MockReply) -> Self {
        self.wlroots = reply;
        self
    }

    pub fn with_x11(mut self, reply: MockReply) -> Self {
        self.x11 = reply;
        self
    }

    pub fn with_cli(mut self, reply: MockReply) -> Self {
        self.cli = reply;
        self
    }

    pub fn with_monitors(mut self, monitors: Vec<MonitorInfo>) -> Self {
        self.monitors = monitors;
        self
    }

    /// Operations invoked so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|(name, _)| *name).collect()
    }

    /// Whether `operation` was invoked with a window service attached
    pub fn saw_window_service(&self, operation: &str) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|(name, with_service)| *name == operation && *with_service)
    }

    fn record(&self, operation: &'static str, with_service: bool) {
        self.calls.lock().push((operation, with_service));
    }
}

#[async_trait]
impl LinuxCaptureRuntime for MockLinuxRuntime {
    fn portal_cancelled_response_code(&self) -> u32 {
        self.cancel_code
    }

    async fn try_portal_capture(
        &self,
        _kind: CaptureKind,
        _options: &CaptureOptions,
    ) -> CaptureResult<PortalResponse> {
        self.record("portal", false);
        Ok(self.portal.clone())
    }

    async fn try_gnome_dbus_capture(
        &self,
        _kind: CaptureKind,
        _options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        self.record("gnome-dbus", false);
        self.gnome.clone().resolve("gnome-dbus").await
    }

    async fn try_kde_dbus_capture(
        &self,
        _kind: CaptureKind,
        _options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        self.record("kde-dbus", false);
        self.kde.clone().resolve("kde-dbus").await
    }

    async fn try_wlroots_capture(
        &self,
        _kind: CaptureKind,
        _desktop: Option<DesktopEnvironment>,
        _options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        self.record("wlroots", false);
        self.wlroots.clone().resolve("wlroots").await
    }

    async fn try_x11_capture(
        &self,
        _kind: CaptureKind,
        window_service: Option<&dyn WindowService>,
        _options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        self.record("x11", window_service.is_some());
        self.x11.clone().resolve("x11").await
    }

    async fn try_cli_capture(
        &self,
        _kind: CaptureKind,
        _desktop: Option<DesktopEnvironment>,
        window_service: Option<&dyn WindowService>,
        _options: &CaptureOptions,
    ) -> CaptureResult<Option<ImageBuffer>> {
        self.record("cli", window_service.is_some());
        self.cli.clone().resolve("cli").await
    }

    async fn monitors(&self) -> Vec<MonitorInfo> {
        self.monitors.clone()
    }
}

// =============================================================================
// MockWindowService
// =============================================================================

/// Window service reporting one focused window
#[derive(Debug, Clone)]
pub struct MockWindowService {
    handle: WindowHandle,
    bounds: Region,
}

impl MockWindowService {
    pub fn new(handle: WindowHandle, bounds: Region) -> Self {
        Self { handle, bounds }
    }
}

impl WindowService for MockWindowService {
    fn foreground_window(&self) -> Option<WindowHandle> {
        Some(self.handle)
    }

    fn window_bounds(&self, handle: WindowHandle) -> Option<Region> {
        (handle == self.handle).then_some(self.bounds)
    }
}

// =============================================================================
// MockStrategy
// =============================================================================

/// Whole-platform strategy with a scripted capture reply
///
/// Captures a 1920x1080 test pattern by default.
#[derive(Debug)]
pub struct MockStrategy {
    id:           String,
    stage:        Stage,
    reply:        MockReply,
    monitors:     Vec<MonitorInfo>,
    capabilities: BackendCapabilities,
    events:       broadcast::Sender<ConfigurationChanged>,
    calls:        AtomicUsize,
}

impl MockStrategy {
    pub fn new(id: &str, stage: Stage) -> Self {
        let (events, _) = broadcast::channel(CONFIGURATION_CHANNEL_CAPACITY);
        Self {
            id: id.to_string(),
            stage,
            reply: MockReply::Image(ImageBuffer::from_test_pattern(1920, 1080)),
            monitors: vec![MonitorInfo::default_display()],
            capabilities: BackendCapabilities::cli(id),
            events,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_image_size(self, width: u32, height: u32) -> Self {
        self.with_reply(MockReply::Image(ImageBuffer::from_test_pattern(width, height)))
    }

    pub fn with_reply(mut self, reply: MockReply) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_monitors(mut self, monitors: Vec<MonitorInfo>) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Broadcasts a hot-plug event; returns the number of receivers reached
    pub fn notify(&self, event: ConfigurationChanged) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Number of `capture` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureStrategy for MockStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities.clone()
    }

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        Ok(self.monitors.clone())
    }

    async fn capture(&self, _request: &CaptureRequest, cancel: &CancellationToken) -> CaptureOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        guarded(&self.id, cancel, self.reply.clone().resolve(&self.id)).await
    }

    fn configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionType;

    #[tokio::test]
    async fn test_delayed_provider_honours_cancel() {
        let provider = MockProvider::succeeding("slow", Stage::Native, 1, 1)
            .with_delay(Duration::from_secs(30));
        let token = CancellationToken::new();
        token.cancel();
        let context = CaptureContext::new(SessionType::X11, None, "X11", false, false);

        let outcome = provider
            .try_capture(&CaptureRequest::new(CaptureKind::FullScreen), &context, &token)
            .await;

        assert!(outcome.is_cancelled());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_runtime_records_calls() {
        let runtime = MockLinuxRuntime::new();
        let service = MockWindowService::new(7, Region::new(0, 0, 5, 5));
        let options = CaptureOptions::default();
        let service: &dyn WindowService = &service;

        runtime
            .try_cli_capture(CaptureKind::ActiveWindow, None, Some(service), &options)
            .await
            .unwrap();
        runtime
            .try_x11_capture(CaptureKind::FullScreen, None, &options)
            .await
            .unwrap();

        assert_eq!(runtime.calls(), vec!["cli", "x11"]);
        assert!(runtime.saw_window_service("cli"));
        assert!(!runtime.saw_window_service("x11"));
    }

    #[test]
    fn test_window_service_only_knows_its_window() {
        let service = MockWindowService::new(7, Region::new(1, 2, 3, 4));

        assert_eq!(service.foreground_window(), Some(7));
        assert_eq!(service.window_bounds(7), Some(Region::new(1, 2, 3, 4)));
        assert_eq!(service.window_bounds(8), None);
    }

    #[tokio::test]
    async fn test_strategy_notify_reaches_subscribers() {
        let strategy = MockStrategy::new("mock", Stage::Native);
        let mut receiver = strategy.configuration_changed();

        let reached = strategy.notify(ConfigurationChanged {
            monitors: vec![MonitorInfo::default_display()],
        });

        assert_eq!(reached, 1);
        assert_eq!(receiver.recv().await.unwrap().monitors.len(), 1);
    }
}
