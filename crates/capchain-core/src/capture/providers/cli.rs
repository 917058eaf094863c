//! External screenshot tool provider

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capture::{
    chain::Stage,
    context::{CaptureContext, CaptureRequest},
    provider::{CaptureOutcome, CaptureProvider, guarded},
    runtime::LinuxCaptureRuntime,
};

pub const CLI_PROVIDER_ID: &str = "cli";

/// Last resort on X11: gnome-screenshot, spectacle, scrot and friends
pub struct CliProvider {
    runtime: Arc<dyn LinuxCaptureRuntime>,
}

impl CliProvider {
    pub fn new(runtime: Arc<dyn LinuxCaptureRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl CaptureProvider for CliProvider {
    fn id(&self) -> &str {
        CLI_PROVIDER_ID
    }

    fn stage(&self) -> Stage {
        Stage::CliFallback
    }

    fn can_handle(&self, _request: &CaptureRequest, context: &CaptureContext) -> bool {
        !context.is_wayland() && !context.sandboxed
    }

    async fn try_capture(
        &self,
        request: &CaptureRequest,
        context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        guarded(
            CLI_PROVIDER_ID,
            cancel,
            self.runtime.try_cli_capture(
                request.kind,
                context.desktop,
                request.window_service.as_deref(),
                &request.options,
            ),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::mock::{MockLinuxRuntime, MockReply},
        error::CaptureError,
        model::{CaptureKind, DesktopEnvironment, SessionType},
    };

    #[test]
    fn test_not_on_wayland() {
        let provider = CliProvider::new(Arc::new(MockLinuxRuntime::new()));
        let request = CaptureRequest::new(CaptureKind::Region);
        let kde_x11 =
            CaptureContext::new(SessionType::X11, Some(DesktopEnvironment::Kde), "X11", false, false);
        let gnome_wayland = CaptureContext::new(
            SessionType::Wayland,
            Some(DesktopEnvironment::Gnome),
            "WAYLAND",
            false,
            true,
        );

        assert!(provider.can_handle(&request, &kde_x11));
        assert!(!provider.can_handle(&request, &gnome_wayland));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let runtime = MockLinuxRuntime::new().with_cli(MockReply::Fail(|| {
            CaptureError::CaptureTimeout { duration_ms: 10_000 }
        }));
        let context =
            CaptureContext::new(SessionType::X11, Some(DesktopEnvironment::Xfce), "X11", false, false);

        let outcome = CliProvider::new(Arc::new(runtime))
            .try_capture(
                &CaptureRequest::new(CaptureKind::FullScreen),
                &context,
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_failure());
    }
}
