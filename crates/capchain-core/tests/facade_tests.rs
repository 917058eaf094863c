//! CaptureBackend behaviour over both engine kinds

mod common;

use std::sync::Arc;

use capchain_core::{
    capture::{
        CaptureBackend, CaptureContext, CaptureRequest, CaptureStrategy, ChainConfig, ChainEngine,
        Stage, StrategyCandidate, StrategyEngine,
        mock::{MockLinuxRuntime, MockReply, MockStrategy},
        select_strategy,
    },
    error::CaptureError,
    model::{
        BackendType, CaptureKind, CaptureOptions, ConfigurationChanged, MonitorInfo, Region,
        SessionType,
    },
};
use common::{image, x11_context};
use tokio_util::sync::CancellationToken;

fn windows_context() -> CaptureContext {
    CaptureContext::new(SessionType::Native, None, "NATIVE", false, false)
}

fn monitor(id: &str, bounds: Region, primary: bool) -> MonitorInfo {
    MonitorInfo {
        id: id.to_string(),
        name: format!("Monitor {id}"),
        is_primary: primary,
        bounds,
        working_area: bounds,
        ..MonitorInfo::default_display()
    }
}

/// Selects `strategy` behind a native candidate that is unsupported here
fn strategy_backend(strategy: Arc<MockStrategy>) -> CaptureBackend {
    let fallback: Arc<dyn CaptureStrategy> = strategy;
    let selection = select_strategy(
        BackendType::Windows,
        vec![
            StrategyCandidate::new("xcap-native", Stage::Native, || Ok(None)),
            StrategyCandidate::new("powershell-cli", Stage::CliFallback, move || {
                Ok(Some(fallback))
            }),
        ],
    )
    .unwrap();
    CaptureBackend::new(Arc::new(StrategyEngine::new(selection)), windows_context())
}

#[tokio::test]
async fn test_selected_fallback_strategy_serves_captures() {
    let strategy = Arc::new(MockStrategy::new("powershell-cli", Stage::CliFallback));
    let backend = strategy_backend(strategy.clone());

    assert_eq!(backend.engine_name().unwrap(), "powershell-cli");

    let execution = backend
        .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(execution.outcome.provider_id(), "powershell-cli");
    assert_eq!(execution.trace.summary(), "powershell-cli:succeeded");
    assert_eq!(strategy.calls(), 1);
}

#[tokio::test]
async fn test_configuration_changes_pass_through() {
    let strategy = Arc::new(MockStrategy::new("xcap-native", Stage::Native));
    let backend = strategy_backend(strategy.clone());
    let mut events = backend.subscribe_configuration_changed().unwrap();

    let monitors = vec![monitor("1", Region::new(0, 0, 2560, 1440), true)];
    assert_eq!(strategy.notify(ConfigurationChanged { monitors: monitors.clone() }), 1);

    let event = events.recv().await.unwrap();
    assert_eq!(event.monitors, monitors);
}

#[tokio::test]
async fn test_chain_engine_publishes_to_subscribers() {
    let runtime = Arc::new(MockLinuxRuntime::new());
    let context = x11_context(None);
    let engine = Arc::new(ChainEngine::linux(runtime, context.clone(), &ChainConfig::default()));
    let backend = CaptureBackend::new(engine.clone(), context);

    let mut first = backend.subscribe_configuration_changed().unwrap();
    let mut second = backend.subscribe_configuration_changed().unwrap();

    assert_eq!(engine.publish_configuration_changed(vec![MonitorInfo::default_display()]), 2);
    assert_eq!(first.recv().await.unwrap().monitors.len(), 1);
    assert_eq!(second.recv().await.unwrap().monitors.len(), 1);
}

#[tokio::test]
async fn test_region_on_left_monitor_uses_virtual_origin() {
    // Secondary monitor left of the primary puts the virtual origin at -1280
    let strategy = Arc::new(
        MockStrategy::new("xcap-native", Stage::Native)
            .with_image_size(3200, 1080)
            .with_monitors(vec![
                monitor("0", Region::new(0, 0, 1920, 1080), true),
                monitor("1", Region::new(-1280, 0, 1280, 1024), false),
            ]),
    );
    let backend = strategy_backend(strategy);

    let execution = backend
        .capture_region(
            Region::new(-100, 10, 200, 50),
            &CaptureOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(execution.outcome.image().unwrap().dimensions(), (200, 50));
    assert_eq!(execution.trace.label(), "region");
}

#[tokio::test]
async fn test_invalid_region_is_an_error_not_an_outcome() {
    let strategy = Arc::new(MockStrategy::new("xcap-native", Stage::Native));
    let backend = strategy_backend(strategy.clone());

    for region in [Region::new(0, 0, 0, 10), Region::new(0, 0, 10, -1)] {
        let err = backend
            .capture_region(region, &CaptureOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidParameter { .. }));
    }
    assert_eq!(strategy.calls(), 0);
}

#[tokio::test]
async fn test_disposed_backend_refuses_everything() {
    let strategy = Arc::new(MockStrategy::new("xcap-native", Stage::Native));
    let backend = strategy_backend(strategy.clone());
    let mut events = backend.subscribe_configuration_changed().unwrap();

    assert!(backend.dispose());
    assert!(!backend.dispose());

    assert!(matches!(backend.get_monitors().await, Err(CaptureError::Disposed { .. })));
    assert!(matches!(backend.get_capabilities(), Err(CaptureError::Disposed { .. })));
    assert!(matches!(
        backend
            .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
            .await,
        Err(CaptureError::Disposed { .. })
    ));
    // Disposed beats an invalid region
    assert!(matches!(
        backend
            .capture_region(
                Region::new(0, 0, 0, 0),
                &CaptureOptions::default(),
                &CancellationToken::new()
            )
            .await,
        Err(CaptureError::Disposed { .. })
    ));

    // Receivers taken before dispose stay usable
    assert_eq!(strategy.notify(ConfigurationChanged { monitors: Vec::new() }), 1);
    assert!(events.recv().await.is_ok());
}

#[tokio::test]
async fn test_concurrent_captures_share_one_backend() {
    let runtime = MockLinuxRuntime::new().with_x11(MockReply::Image(image(100, 100)));
    let (backend, runtime) = common::linux_backend(runtime, x11_context(None));
    let backend = Arc::new(backend);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let backend = backend.clone();
            tokio::spawn(async move {
                backend
                    .capture(&CaptureRequest::new(CaptureKind::FullScreen), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        let execution = task.unwrap().unwrap();
        assert_eq!(execution.outcome.provider_id(), "x11");
        assert_eq!(execution.trace.attempted_ids(), vec!["x11"]);
    }
    assert_eq!(runtime.calls().len(), 8);
}
