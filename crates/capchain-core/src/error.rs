//! Error types for capture operations
//!
//! Only a few of these ever reach a caller of the facade: an invalid region,
//! use after disposal, and a platform where no capture strategy could be
//! constructed. Everything else is raised inside a provider or strategy and is
//! converted into a `Failure` (or `Cancelled`) outcome plus a decision trace
//! reason before the chain walk sees it.

use crate::model::BackendType;

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Error type for capture operations
///
/// Each variant renders a user-facing message and provides a remediation hint
/// through [`CaptureError::remediation_hint`].
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Invalid parameter provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// The backend was disposed before the operation was attempted
    #[error("Capture backend was disposed; cannot {operation}")]
    Disposed {
        /// Operation that was rejected
        operation: String,
    },

    /// No capture mechanism could be constructed for this platform
    #[error("Backend {backend} is not available on this platform")]
    BackendNotAvailable {
        /// Backend type that's unavailable
        backend: BackendType,
    },

    /// Capture operation timed out
    #[error("Capture operation timed out after {duration_ms}ms")]
    CaptureTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Required desktop portal is unavailable
    #[error("Desktop portal '{portal}' is unavailable")]
    PortalUnavailable {
        /// Name of the unavailable portal
        portal: String,
    },

    /// A desktop D-Bus service rejected or failed the request
    #[error("D-Bus call to {service} failed: {reason}")]
    DbusError {
        /// Bus name of the service
        service: String,
        /// Error name or message returned by the bus
        reason: String,
    },

    /// External screenshot tool is not installed
    #[error("Screenshot tool '{tool}' was not found on PATH")]
    ToolNotFound {
        /// Executable name
        tool: String,
    },

    /// External screenshot tool exited unsuccessfully
    #[error("Screenshot tool '{tool}' exited with {}", describe_exit(.exit_code))]
    ToolFailed {
        /// Executable name
        tool: String,
        /// Exit code, if the process was not killed by a signal
        exit_code: Option<i32>,
    },

    /// External screenshot tool exited cleanly but produced no image
    #[error("Screenshot tool '{tool}' did not write an output file")]
    NoOutput {
        /// Executable name
        tool: String,
    },

    /// The user dismissed a capture dialog or selection
    #[error("Capture cancelled by the user in {provider}")]
    UserCancelled {
        /// Mechanism that reported the cancellation
        provider: String,
    },

    /// Requested capability is not supported by this mechanism
    #[error("Feature '{feature}' is not supported by backend {backend}")]
    NotSupported {
        /// Name of the unsupported feature
        feature: String,
        /// Backend that doesn't support the feature
        backend: BackendType,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image decoding or processing error
    #[error("Image processing error: {0}")]
    ImageError(String),
}

impl CaptureError {
    /// Returns an actionable remediation hint for this error
    ///
    /// # Examples
    ///
    /// ```
    /// use capchain_core::error::CaptureError;
    ///
    /// let error = CaptureError::ToolNotFound {
    ///     tool: "scrot".to_string(),
    /// };
    /// assert!(error.remediation_hint().contains("Install"));
    /// ```
    pub fn remediation_hint(&self) -> &str {
        match self {
            CaptureError::InvalidParameter { parameter, .. } => match parameter.as_str() {
                "region" => "Region width and height must both be greater than zero.",
                _ => "Check the parameter value against the API documentation.",
            },
            CaptureError::Disposed { .. } => {
                "Create a new capture backend; a disposed backend cannot be reused."
            }
            CaptureError::BackendNotAvailable { backend } => match backend {
                BackendType::Wayland => {
                    "No Wayland capture path worked. Install xdg-desktop-portal with a backend \
                     for your desktop, or grim for wlroots compositors."
                }
                BackendType::X11 => {
                    "X11 capture not available. Ensure DISPLAY is set and the X server allows \
                     screen capture."
                }
                BackendType::Windows => {
                    "Neither native capture nor the PowerShell fallback could be initialised."
                }
                BackendType::MacOS => {
                    "Grant screen recording permission in System Settings > Privacy & Security \
                     > Screen Recording."
                }
                BackendType::None => "No screenshot backend available on this platform.",
            },
            CaptureError::CaptureTimeout { .. } => {
                "The capture took too long. Close any stuck permission dialog and retry, or \
                 raise the timeout with the CAPCHAIN_*_TIMEOUT environment variables."
            }
            CaptureError::PortalUnavailable { .. } => {
                "Install xdg-desktop-portal and a backend such as xdg-desktop-portal-gnome, \
                 xdg-desktop-portal-kde or xdg-desktop-portal-wlr."
            }
            CaptureError::DbusError { service, .. } => {
                if service.contains("KWin") {
                    "KWin restricts ScreenShot2 to authorised applications. Add the interface to \
                     X-KDE-DBUS-Restricted-Interfaces or rely on the portal."
                } else if service.contains("gnome") {
                    "GNOME Shell only allows its screenshot interface to allowlisted callers. \
                     The portal path is used instead."
                } else {
                    "Check that the session bus is running and the desktop service is available."
                }
            }
            CaptureError::ToolNotFound { .. } => {
                "Install a screenshot tool such as gnome-screenshot, spectacle, scrot or grim."
            }
            CaptureError::ToolFailed { .. } | CaptureError::NoOutput { .. } => {
                "The screenshot tool did not produce an image. Run it manually to see its error \
                 output."
            }
            CaptureError::UserCancelled { .. } => "The capture was dismissed; retry when ready.",
            CaptureError::NotSupported { .. } => {
                "This capture kind is not supported by the selected mechanism; another provider \
                 will be tried."
            }
            CaptureError::IoError(_) => {
                "An I/O error occurred. Check temp directory permissions and free disk space."
            }
            CaptureError::ImageError(_) => {
                "The captured file could not be decoded. Ensure the tool writes PNG output."
            }
        }
    }

    /// Whether this error represents an explicit user cancellation
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, CaptureError::UserCancelled { .. })
    }

    /// Shorthand for an invalid `region` parameter
    pub(crate) fn invalid_region(reason: impl Into<String>) -> Self {
        CaptureError::InvalidParameter {
            parameter: "region".to_string(),
            reason: reason.into(),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::ImageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_region_message() {
        let error = CaptureError::invalid_region("width must be positive, got 0");
        assert_eq!(
            error.to_string(),
            "Invalid parameter 'region': width must be positive, got 0"
        );
        assert!(error.remediation_hint().contains("greater than zero"));
    }

    #[test]
    fn test_disposed_message() {
        let error = CaptureError::Disposed {
            operation: "get_monitors".to_string(),
        };
        assert!(error.to_string().contains("get_monitors"));
        assert!(error.remediation_hint().contains("new capture backend"));
    }

    #[test]
    fn test_tool_failed_with_exit_code() {
        let error = CaptureError::ToolFailed {
            tool: "scrot".to_string(),
            exit_code: Some(2),
        };
        assert_eq!(error.to_string(), "Screenshot tool 'scrot' exited with code 2");
    }

    #[test]
    fn test_tool_failed_by_signal() {
        let error = CaptureError::ToolFailed {
            tool: "import".to_string(),
            exit_code: None,
        };
        assert_eq!(error.to_string(), "Screenshot tool 'import' exited with a signal");
    }

    #[test]
    fn test_user_cancelled_detection() {
        let cancelled = CaptureError::UserCancelled {
            provider: "gnome-dbus".to_string(),
        };
        assert!(cancelled.is_user_cancellation());

        let timeout = CaptureError::CaptureTimeout { duration_ms: 10 };
        assert!(!timeout.is_user_cancellation());
    }

    #[test]
    fn test_dbus_remediation_by_service() {
        let kwin = CaptureError::DbusError {
            service: "org.kde.KWin.ScreenShot2".to_string(),
            reason: "NoAuthorized".to_string(),
        };
        assert!(kwin.remediation_hint().contains("X-KDE-DBUS-Restricted-Interfaces"));

        let gnome = CaptureError::DbusError {
            service: "org.gnome.Shell.Screenshot".to_string(),
            reason: "AccessDenied".to_string(),
        };
        assert!(gnome.remediation_hint().contains("allowlisted"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: CaptureError = io_err.into();
        assert!(matches!(error, CaptureError::IoError(_)));
    }

    #[test]
    fn test_backend_not_available_hints() {
        for backend in [
            BackendType::None,
            BackendType::Wayland,
            BackendType::X11,
            BackendType::Windows,
            BackendType::MacOS,
        ] {
            let error = CaptureError::BackendNotAvailable { backend };
            assert!(!error.remediation_hint().is_empty());
        }
    }
}
