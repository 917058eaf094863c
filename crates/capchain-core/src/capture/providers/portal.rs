//! XDG desktop portal provider

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capture::{
    chain::Stage,
    context::{CaptureContext, CaptureRequest},
    provider::{CaptureOutcome, CaptureProvider},
    runtime::LinuxCaptureRuntime,
};

pub const PORTAL_PROVIDER_ID: &str = "portal";

/// Captures through `org.freedesktop.portal.Screenshot`
///
/// The only provider allowed inside a sandbox. A dismissed portal dialog is
/// reported as `Cancelled`, which stops the chain.
pub struct PortalProvider {
    runtime: Arc<dyn LinuxCaptureRuntime>,
}

impl PortalProvider {
    pub fn new(runtime: Arc<dyn LinuxCaptureRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl CaptureProvider for PortalProvider {
    fn id(&self) -> &str {
        PORTAL_PROVIDER_ID
    }

    fn stage(&self) -> Stage {
        Stage::Portal
    }

    fn can_handle(&self, request: &CaptureRequest, context: &CaptureContext) -> bool {
        context.should_try_portal(request)
    }

    async fn try_capture(
        &self,
        request: &CaptureRequest,
        _context: &CaptureContext,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        let call = self.runtime.try_portal_capture(request.kind, &request.options);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CaptureOutcome::cancelled(PORTAL_PROVIDER_ID),
            result = call => result,
        };

        match result {
            Ok(response) => match response.image {
                Some(image) => CaptureOutcome::success(PORTAL_PROVIDER_ID, image),
                None if response.response == self.runtime.portal_cancelled_response_code() => {
                    CaptureOutcome::cancelled(PORTAL_PROVIDER_ID)
                }
                None => CaptureOutcome::failure(
                    PORTAL_PROVIDER_ID,
                    format!("portal returned no image (response {})", response.response),
                ),
            },
            Err(err) if err.is_user_cancellation() => CaptureOutcome::cancelled(PORTAL_PROVIDER_ID),
            Err(err) => CaptureOutcome::failure(PORTAL_PROVIDER_ID, err.to_string()),
        }
    }
}
