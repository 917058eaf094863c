//! Per-platform capture facade
//!
//! [`CaptureBackend`] is the public surface: build it once, capture any
//! number of times, dispose it once. It owns one [`CaptureEngine`]:
//!
//! - [`ChainEngine`] on Linux walks the full provider chain per call
//! - [`StrategyEngine`] on Windows and macOS wraps the single strategy chosen
//!   at construction
//!
//! Every call after [`CaptureBackend::dispose`] fails with
//! [`CaptureError::Disposed`]. A region with a non-positive size is rejected
//! with [`CaptureError::InvalidParameter`] before any provider runs.

use std::{ops::ControlFlow, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{
    chain::ChainWalk,
    config::ChainConfig,
    context::{CaptureContext, CaptureRequest},
    orchestrator::{CaptureOrchestrator, ProviderPlan, finish},
    provider::{CaptureExecution, CaptureOutcome},
    providers::default_linux_chain,
    runtime::LinuxCaptureRuntime,
    strategy::{
        CONFIGURATION_CHANNEL_CAPACITY, CaptureStrategy, StrategySelection, crop_outcome,
    },
    trace::DecisionTrace,
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{
        BackendCapabilities, CaptureKind, CaptureOptions, ConfigurationChanged, MAX_CAPTURE_RESOLUTION,
        MonitorInfo, Region,
    },
};

/// Whatever a facade delegates to
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>>;

    /// What a capture of `request` would try, without capturing
    fn plan(&self, request: &CaptureRequest) -> Vec<ProviderPlan>;

    async fn capture(&self, request: &CaptureRequest, cancel: &CancellationToken) -> CaptureExecution;

    async fn capture_region(
        &self,
        region: Region,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> CaptureExecution;

    fn subscribe_configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged>;
}

// =============================================================================
// ChainEngine
// =============================================================================

/// Provider chain walked against a fixed context
pub struct ChainEngine {
    orchestrator: CaptureOrchestrator,
    runtime:      Arc<dyn LinuxCaptureRuntime>,
    context:      CaptureContext,
    events:       broadcast::Sender<ConfigurationChanged>,
}

impl ChainEngine {
    pub fn new(
        orchestrator: CaptureOrchestrator,
        runtime: Arc<dyn LinuxCaptureRuntime>,
        context: CaptureContext,
    ) -> Self {
        let (events, _) = broadcast::channel(CONFIGURATION_CHANNEL_CAPACITY);
        Self {
            orchestrator,
            runtime,
            context,
            events,
        }
    }

    /// The standard Linux chain over `runtime`
    pub fn linux(
        runtime: Arc<dyn LinuxCaptureRuntime>,
        context: CaptureContext,
        config: &ChainConfig,
    ) -> Self {
        let orchestrator = CaptureOrchestrator::new(default_linux_chain(runtime.clone(), config));
        Self::new(orchestrator, runtime, context)
    }

    pub fn orchestrator(&self) -> &CaptureOrchestrator {
        &self.orchestrator
    }

    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    /// Forwards a monitor change to subscribers; returns how many it reached
    pub fn publish_configuration_changed(&self, monitors: Vec<MonitorInfo>) -> usize {
        self.events.send(ConfigurationChanged { monitors }).unwrap_or(0)
    }
}

#[async_trait]
impl CaptureEngine for ChainEngine {
    fn name(&self) -> &str {
        "linux-chain"
    }

    fn capabilities(&self) -> BackendCapabilities {
        let wayland = self.context.is_wayland();
        BackendCapabilities {
            backend_name:                   format!("linux provider chain ({})", self.context.session),
            version:                        env!("CARGO_PKG_VERSION").to_string(),
            supports_hardware_acceleration: false,
            supports_cursor_capture:        !self.context.sandboxed,
            supports_hdr:                   false,
            supports_per_monitor_dpi:       wayland,
            supports_monitor_hotplug:       false,
            max_capture_resolution:         MAX_CAPTURE_RESOLUTION,
            // Portal dialogs ask the user first
            requires_permission:            self.context.sandboxed || wayland,
        }
    }

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        Ok(self.runtime.monitors().await)
    }

    fn plan(&self, request: &CaptureRequest) -> Vec<ProviderPlan> {
        self.orchestrator.plan(request, &self.context)
    }

    async fn capture(&self, request: &CaptureRequest, cancel: &CancellationToken) -> CaptureExecution {
        self.orchestrator.capture(request, &self.context, cancel).await
    }

    /// Walks the chain for a full-screen image and crops it
    ///
    /// The trace describes the walk; a crop that leaves nothing turns the
    /// outcome into a failure without changing the trace.
    async fn capture_region(
        &self,
        region: Region,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> CaptureExecution {
        let request = CaptureRequest::new(CaptureKind::FullScreen).with_options(*options);
        let execution = self.orchestrator.capture(&request, &self.context, cancel).await;
        if !execution.outcome.is_success() {
            return execution;
        }

        let monitors = self.runtime.monitors().await;
        CaptureExecution {
            outcome: crop_outcome(execution.outcome, region, &monitors),
            trace:   execution.trace,
        }
    }

    fn subscribe_configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.events.subscribe()
    }
}

// =============================================================================
// StrategyEngine
// =============================================================================

/// The single strategy picked at construction
pub struct StrategyEngine {
    strategy:  Arc<dyn CaptureStrategy>,
    selection: DecisionTrace,
}

impl StrategyEngine {
    pub fn new(selection: StrategySelection) -> Self {
        Self {
            strategy:  selection.strategy,
            selection: selection.trace,
        }
    }

    /// How the strategy was chosen
    pub fn selection_trace(&self) -> &DecisionTrace {
        &self.selection
    }

    pub fn strategy(&self) -> &Arc<dyn CaptureStrategy> {
        &self.strategy
    }

    /// Records the strategy's answer as a one-step walk
    fn execution(&self, label: &str, outcome: CaptureOutcome) -> CaptureExecution {
        let mut walk = ChainWalk::start(label);
        let done = match walk.step(self.strategy.stage(), self.strategy.id(), outcome.into_attempt()) {
            ControlFlow::Break(done) => done,
            ControlFlow::Continue(()) => walk.exhaust(),
        };
        finish(done, walk, 1)
    }
}

#[async_trait]
impl CaptureEngine for StrategyEngine {
    fn name(&self) -> &str {
        self.strategy.id()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.strategy.capabilities()
    }

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        self.strategy.monitors().await
    }

    fn plan(&self, _request: &CaptureRequest) -> Vec<ProviderPlan> {
        vec![ProviderPlan {
            provider_id:   self.strategy.id().to_string(),
            stage:         self.strategy.stage(),
            stage_enabled: true,
            applicable:    true,
        }]
    }

    async fn capture(&self, request: &CaptureRequest, cancel: &CancellationToken) -> CaptureExecution {
        let outcome = if cancel.is_cancelled() {
            CaptureOutcome::cancelled(self.strategy.id())
        } else {
            self.strategy.capture(request, cancel).await
        };
        self.execution(request.kind.as_str(), outcome)
    }

    async fn capture_region(
        &self,
        region: Region,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> CaptureExecution {
        let outcome = if cancel.is_cancelled() {
            CaptureOutcome::cancelled(self.strategy.id())
        } else {
            self.strategy.capture_region(region, options, cancel).await
        };
        self.execution(CaptureKind::Region.as_str(), outcome)
    }

    fn subscribe_configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.strategy.configuration_changed()
    }
}

// =============================================================================
// CaptureBackend
// =============================================================================

/// Construct-once, dispose-once capture facade
pub struct CaptureBackend {
    engine:  Mutex<Option<Arc<dyn CaptureEngine>>>,
    context: CaptureContext,
}

impl CaptureBackend {
    pub fn new(engine: Arc<dyn CaptureEngine>, context: CaptureContext) -> Self {
        Self {
            engine: Mutex::new(Some(engine)),
            context,
        }
    }

    /// Detects the platform and wires its chain or strategy with defaults
    pub async fn create_default() -> CaptureResult<Self> {
        Self::create_with_config(&ChainConfig::default()).await
    }

    /// Detects the platform and wires its chain or strategy
    ///
    /// # Errors
    ///
    /// `BackendNotAvailable` when no capture mechanism can be built here.
    pub async fn create_with_config(config: &ChainConfig) -> CaptureResult<Self> {
        let (engine, context) = platform::default_engine(config).await?;
        tracing::info!(
            "Capture backend ready: {} (session {}, desktop {}, sandboxed {})",
            engine.name(),
            context.session,
            context.desktop.map(|d| d.as_str()).unwrap_or("unknown"),
            context.sandboxed
        );
        Ok(Self::new(engine, context))
    }

    /// The context snapshot taken at construction
    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    fn engine(&self, operation: &str) -> CaptureResult<Arc<dyn CaptureEngine>> {
        self.engine.lock().clone().ok_or_else(|| CaptureError::Disposed {
            operation: operation.to_string(),
        })
    }

    pub fn engine_name(&self) -> CaptureResult<String> {
        Ok(self.engine("read engine name")?.name().to_string())
    }

    pub async fn get_monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        self.engine("enumerate monitors")?.monitors().await
    }

    pub fn get_capabilities(&self) -> CaptureResult<BackendCapabilities> {
        Ok(self.engine("report capabilities")?.capabilities())
    }

    /// Provider order and applicability for `request` in this context
    pub fn plan(&self, request: &CaptureRequest) -> CaptureResult<Vec<ProviderPlan>> {
        Ok(self.engine("plan capture")?.plan(request))
    }

    /// Runs one capture of any kind
    pub async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> CaptureResult<CaptureExecution> {
        let engine = self.engine("capture")?;
        Ok(engine.capture(request, cancel).await)
    }

    /// Captures a physical-pixel region of the virtual desktop
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a non-positive width or height, `Disposed` after
    /// [`dispose`](Self::dispose). Capture problems are outcomes, not errors.
    pub async fn capture_region(
        &self,
        region: Region,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> CaptureResult<CaptureExecution> {
        let engine = self.engine("capture region")?;
        if region.is_empty() {
            return Err(CaptureError::invalid_region(format!(
                "Invalid region size: {}x{}",
                region.width, region.height
            )));
        }
        Ok(engine.capture_region(region, options, cancel).await)
    }

    pub fn subscribe_configuration_changed(
        &self,
    ) -> CaptureResult<broadcast::Receiver<ConfigurationChanged>> {
        Ok(self
            .engine("subscribe to configuration changes")?
            .subscribe_configuration_changed())
    }

    /// Releases the engine; returns false if it was already released
    pub fn dispose(&self) -> bool {
        let released = self.engine.lock().take();
        match released {
            Some(engine) => {
                tracing::debug!("Disposed capture backend {}", engine.name());
                true
            }
            None => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.lock().is_none()
    }
}

impl std::fmt::Debug for CaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBackend")
            .field("context", &self.context)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// =============================================================================
// Platform wiring
// =============================================================================

#[cfg(target_os = "linux")]
mod platform {
    use std::sync::Arc;

    use super::{CaptureEngine, ChainEngine};
    use crate::{
        capture::{config::ChainConfig, context::CaptureContext},
        error::CaptureResult,
        util::detect::detect_environment,
    };

    #[cfg(feature = "native")]
    pub(super) async fn default_engine(
        config: &ChainConfig,
    ) -> CaptureResult<(Arc<dyn CaptureEngine>, CaptureContext)> {
        use crate::capture::linux_runtime::{NativeLinuxRuntime, probe_screenshot_portal};

        let env = detect_environment();
        let portal = probe_screenshot_portal().await;
        let context = CaptureContext::from_environment(&env, portal);
        let runtime = Arc::new(NativeLinuxRuntime::new(config, &context));
        let engine: Arc<dyn CaptureEngine> = Arc::new(ChainEngine::linux(runtime, context.clone(), config));
        Ok((engine, context))
    }

    #[cfg(not(feature = "native"))]
    pub(super) async fn default_engine(
        _config: &ChainConfig,
    ) -> CaptureResult<(Arc<dyn CaptureEngine>, CaptureContext)> {
        let env = detect_environment();
        tracing::warn!("Built without the native feature; no Linux capture runtime");
        Err(crate::error::CaptureError::BackendNotAvailable {
            backend: env.session.backend_type(),
        })
    }
}

#[cfg(any(target_os = "windows", target_os = "macos"))]
mod platform {
    use std::sync::Arc;

    use super::{CaptureEngine, StrategyEngine};
    use crate::{
        capture::{
            chain::Stage,
            cli_runner::CliToolRunner,
            cli_strategy::{CliStrategy, POWERSHELL_STRATEGY_ID, SCREENCAPTURE_STRATEGY_ID},
            config::ChainConfig,
            context::CaptureContext,
            strategy::{CaptureStrategy, StrategyCandidate, select_strategy},
        },
        error::CaptureResult,
        model::BackendType,
        util::detect::detect_environment,
    };

    /// Native first, then the platform's screenshot tool
    fn candidates(backend: BackendType, config: &ChainConfig) -> Vec<StrategyCandidate> {
        let mut candidates = Vec::new();

        #[cfg(feature = "native")]
        candidates.push(StrategyCandidate::new(
            crate::capture::xcap_strategy::XCAP_STRATEGY_ID,
            Stage::Native,
            move || crate::capture::xcap_strategy::XcapStrategy::probe(backend),
        ));

        let runner = CliToolRunner::from_config(config);
        let (id, strategy) = if backend == BackendType::Windows {
            (POWERSHELL_STRATEGY_ID, CliStrategy::powershell(runner))
        } else {
            (SCREENCAPTURE_STRATEGY_ID, CliStrategy::screencapture(runner))
        };
        candidates.push(StrategyCandidate::new(id, Stage::CliFallback, move || {
            Ok(strategy
                .is_supported()
                .then(|| Arc::new(strategy) as Arc<dyn CaptureStrategy>))
        }));

        candidates
    }

    pub(super) async fn default_engine(
        config: &ChainConfig,
    ) -> CaptureResult<(Arc<dyn CaptureEngine>, CaptureContext)> {
        let env = detect_environment();
        let context = CaptureContext::from_environment(&env, false);
        let backend = context.session.backend_type();
        let selection = select_strategy(backend, candidates(backend, config))?;
        let engine: Arc<dyn CaptureEngine> = Arc::new(StrategyEngine::new(selection));
        Ok((engine, context))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
mod platform {
    use std::sync::Arc;

    use super::CaptureEngine;
    use crate::{
        capture::{config::ChainConfig, context::CaptureContext},
        error::{CaptureError, CaptureResult},
        model::BackendType,
    };

    pub(super) async fn default_engine(
        _config: &ChainConfig,
    ) -> CaptureResult<(Arc<dyn CaptureEngine>, CaptureContext)> {
        Err(CaptureError::BackendNotAvailable {
            backend: BackendType::None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{
            chain::Stage,
            mock::{MockLinuxRuntime, MockReply, MockStrategy},
            strategy::{StrategyCandidate, select_strategy},
            trace::DecisionOutcome,
        },
        model::{BackendType, DesktopEnvironment, SessionType},
    };

    fn x11_context() -> CaptureContext {
        CaptureContext::new(SessionType::X11, Some(DesktopEnvironment::Xfce), "X11", false, false)
    }

    fn chain_backend(runtime: MockLinuxRuntime) -> CaptureBackend {
        let context = x11_context();
        let engine = ChainEngine::linux(Arc::new(runtime), context.clone(), &ChainConfig::default());
        CaptureBackend::new(Arc::new(engine), context)
    }

    fn strategy_backend(strategy: MockStrategy) -> CaptureBackend {
        let strategy: Arc<dyn CaptureStrategy> = Arc::new(strategy);
        let selection = select_strategy(
            BackendType::Windows,
            vec![StrategyCandidate::new("mock", Stage::Native, move || Ok(Some(strategy)))],
        )
        .unwrap();
        let context = CaptureContext::new(SessionType::Native, None, "NATIVE", false, false);
        CaptureBackend::new(Arc::new(StrategyEngine::new(selection)), context)
    }

    #[tokio::test]
    async fn test_non_positive_region_rejected_before_any_provider() {
        let backend = chain_backend(MockLinuxRuntime::new());

        for region in [Region::new(0, 0, 0, 10), Region::new(0, 0, 10, -1)] {
            let result = backend
                .capture_region(region, &CaptureOptions::default(), &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(CaptureError::InvalidParameter { .. })));
        }
    }

    #[tokio::test]
    async fn test_chain_region_is_cropped_from_full_screen() {
        let runtime = MockLinuxRuntime::new()
            .with_x11(MockReply::Image(crate::capture::ImageBuffer::from_test_pattern(1920, 1080)));
        let backend = chain_backend(runtime);

        let execution = backend
            .capture_region(
                Region::new(100, 100, 300, 200),
                &CaptureOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(execution.outcome.provider_id(), "x11");
        assert_eq!(execution.outcome.image().map(|i| i.dimensions()), Some((300, 200)));
    }

    #[tokio::test]
    async fn test_region_outside_desktop_is_failure_outcome() {
        let runtime = MockLinuxRuntime::new()
            .with_x11(MockReply::Image(crate::capture::ImageBuffer::from_test_pattern(1920, 1080)));
        let backend = chain_backend(runtime);

        let execution = backend
            .capture_region(
                Region::new(4000, 0, 10, 10),
                &CaptureOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(execution.outcome.is_failure());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_blocks_everything() {
        let backend = strategy_backend(MockStrategy::new("mock", Stage::Native));

        assert!(backend.dispose());
        assert!(!backend.dispose());
        assert!(backend.is_disposed());

        assert!(matches!(backend.get_monitors().await, Err(CaptureError::Disposed { .. })));
        assert!(matches!(backend.get_capabilities(), Err(CaptureError::Disposed { .. })));
        assert!(matches!(
            backend.subscribe_configuration_changed(),
            Err(CaptureError::Disposed { .. })
        ));
        let result = backend
            .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CaptureError::Disposed { .. })));
    }

    #[tokio::test]
    async fn test_strategy_engine_traces_single_step() {
        let backend = strategy_backend(MockStrategy::new("mock", Stage::Native).with_image_size(64, 48));

        let execution = backend
            .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(execution.outcome.image().map(|i| i.dimensions()), Some((64, 48)));
        assert_eq!(execution.trace.summary(), "mock:succeeded");
        assert_eq!(execution.trace.final_outcome(), Some(DecisionOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_strategy_failure_is_exhausted_failure() {
        let backend = strategy_backend(
            MockStrategy::new("mock", Stage::Native).with_reply(MockReply::Error("gone".into())),
        );

        let execution = backend
            .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
            .await
            .unwrap();

        assert!(execution.outcome.is_failure());
        assert_eq!(execution.trace.steps()[0].outcome, DecisionOutcome::Failed);
        assert_eq!(execution.trace.final_provider_id(), None);
    }

    #[tokio::test]
    async fn test_chain_capabilities_follow_context() {
        let backend = chain_backend(MockLinuxRuntime::new());

        let capabilities = backend.get_capabilities().unwrap();

        assert!(capabilities.backend_name.contains("x11"));
        assert!(!capabilities.requires_permission);
        assert_eq!(backend.engine_name().unwrap(), "linux-chain");
    }

    #[test]
    fn test_plan_comes_from_the_engine() {
        let chain = chain_backend(MockLinuxRuntime::new());
        let request = CaptureRequest::new(CaptureKind::FullScreen);
        let runnable: Vec<String> = chain
            .plan(&request)
            .unwrap()
            .into_iter()
            .filter(|entry| entry.would_run())
            .map(|entry| entry.provider_id)
            .collect();
        assert_eq!(runnable, vec!["x11", "cli"]);

        let strategy = strategy_backend(MockStrategy::new("mock", Stage::Native));
        let plan = strategy.plan(&request).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].provider_id, "mock");

        strategy.dispose();
        assert!(matches!(strategy.plan(&request), Err(CaptureError::Disposed { .. })));
    }

    #[test]
    fn test_strategy_engine_keeps_selection_trace() {
        let preferred: Arc<dyn CaptureStrategy> =
            Arc::new(MockStrategy::new("cli", Stage::CliFallback));
        let selection = select_strategy(
            BackendType::MacOS,
            vec![
                StrategyCandidate::new("native", Stage::Native, || Ok(None)),
                StrategyCandidate::new("cli", Stage::CliFallback, move || Ok(Some(preferred))),
            ],
        )
        .unwrap();

        let engine = StrategyEngine::new(selection);

        assert_eq!(engine.strategy().id(), "cli");
        assert_eq!(engine.selection_trace().summary(), "native:skipped -> cli:succeeded");
    }
}
