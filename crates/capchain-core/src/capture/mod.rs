//! Capture provider chain, strategies, and the platform facade
//!
//! This module provides:
//!
//! - `CaptureProvider`: one capture mechanism with an applicability check and
//!   an async attempt that always returns a tri-state `CaptureOutcome`
//! - `CaptureOrchestrator`: walks providers in stage order and records a
//!   `DecisionTrace`
//! - `CaptureStrategy`: a whole-platform mechanism chosen once at
//!   construction (Windows, macOS)
//! - `CaptureBackend`: the construct-once, dispose-once facade over either
//!
//! Linux providers never touch the OS directly. They call a
//! `LinuxCaptureRuntime`, implemented natively in `linux_runtime` and by
//! `mock::MockLinuxRuntime` in tests.

pub mod chain;
pub mod cli_runner;
pub mod cli_strategy;
pub mod config;
pub mod constants;
pub mod context;
pub mod facade;
pub mod image_buffer;
pub mod mock;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod qimage;
pub mod runtime;
pub mod strategy;
pub mod trace;

#[cfg(all(target_os = "linux", feature = "native"))]
pub mod linux_runtime;

#[cfg(all(
    feature = "native",
    any(target_os = "linux", target_os = "windows", target_os = "macos")
))]
pub mod xcap_capture;

#[cfg(all(feature = "native", any(target_os = "windows", target_os = "macos")))]
pub mod xcap_strategy;

pub use chain::Stage;
pub use config::ChainConfig;
pub use context::{CaptureContext, CaptureRequest, WindowService};
pub use facade::{CaptureBackend, CaptureEngine, ChainEngine, StrategyEngine};
pub use image_buffer::ImageBuffer;
#[cfg(all(target_os = "linux", feature = "native"))]
pub use linux_runtime::NativeLinuxRuntime;
pub use orchestrator::{CaptureOrchestrator, ProviderPlan, StagePolicy, WaterfallPolicy};
pub use provider::{CaptureExecution, CaptureOutcome, CaptureProvider};
pub use runtime::{LinuxCaptureRuntime, PortalResponse};
pub use strategy::{CaptureStrategy, StrategyCandidate, StrategySelection, select_strategy};
pub use trace::{DecisionOutcome, DecisionStep, DecisionTrace};

use crate::error::CaptureResult;

/// Detects the platform and builds its default capture backend
///
/// # Examples
///
/// ```no_run
/// use capchain_core::{capture::create_default_backend, model::CaptureKind};
/// use capchain_core::capture::CaptureRequest;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = create_default_backend().await?;
///     let execution = backend
///         .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
///         .await?;
///     println!("{}", execution.trace.summary());
///     backend.dispose();
///     Ok(())
/// }
/// ```
pub async fn create_default_backend() -> CaptureResult<CaptureBackend> {
    CaptureBackend::create_default().await
}
