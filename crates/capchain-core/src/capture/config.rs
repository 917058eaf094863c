//! Chain configuration
//!
//! Which desktops each desktop-specific provider accepts is data, not code.
//! Every field has a default, so a partial JSON document only overrides what
//! it names:
//!
//! ```
//! use capchain_core::{capture::ChainConfig, model::DesktopEnvironment};
//!
//! let config: ChainConfig = serde_json::from_str(r#"{"kde_desktops": ["KDE"]}"#).unwrap();
//! assert_eq!(config.kde_desktops, vec![DesktopEnvironment::Kde]);
//! assert!(config.gnome_desktops.contains(&DesktopEnvironment::Mate));
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::constants;
use crate::{
    error::{CaptureError, CaptureResult},
    model::DesktopEnvironment,
};

/// Desktop sets and CLI runner settings used to wire the Linux chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Desktops served by `org.gnome.Shell.Screenshot`
    pub gnome_desktops:             Vec<DesktopEnvironment>,
    /// Desktops served by `org.kde.KWin.ScreenShot2`
    pub kde_desktops:               Vec<DesktopEnvironment>,
    /// Wayland compositors driven through grim-style tools
    pub wlroots_desktops:           Vec<DesktopEnvironment>,
    pub cli_timeout_ms:             u64,
    pub cli_interactive_timeout_ms: u64,
    /// Root for capture temp files; the system temp dir when unset
    pub temp_dir:                   Option<PathBuf>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            gnome_desktops:             vec![
                DesktopEnvironment::Gnome,
                DesktopEnvironment::Mate,
                DesktopEnvironment::Cinnamon,
            ],
            kde_desktops:               vec![DesktopEnvironment::Kde, DesktopEnvironment::Lxqt],
            wlroots_desktops:           vec![DesktopEnvironment::Hyprland, DesktopEnvironment::Sway],
            cli_timeout_ms:             constants::cli_timeout_ms(),
            cli_interactive_timeout_ms: constants::cli_interactive_timeout_ms(),
            temp_dir:                   None,
        }
    }
}

impl ChainConfig {
    /// Reads a JSON config file
    pub fn from_file(path: &Path) -> CaptureResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| CaptureError::InvalidParameter {
            parameter: "config".to_string(),
            reason:    format!("{}: {}", path.display(), e),
        })
    }

    pub fn is_gnome(&self, desktop: Option<DesktopEnvironment>) -> bool {
        desktop.is_some_and(|d| self.gnome_desktops.contains(&d))
    }

    pub fn is_kde(&self, desktop: Option<DesktopEnvironment>) -> bool {
        desktop.is_some_and(|d| self.kde_desktops.contains(&d))
    }

    pub fn is_wlroots(&self, desktop: Option<DesktopEnvironment>) -> bool {
        desktop.is_some_and(|d| self.wlroots_desktops.contains(&d))
    }

    /// Temp root handed to the CLI runner
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desktop_sets() {
        let config = ChainConfig::default();

        assert!(config.is_gnome(Some(DesktopEnvironment::Cinnamon)));
        assert!(config.is_kde(Some(DesktopEnvironment::Lxqt)));
        assert!(config.is_wlroots(Some(DesktopEnvironment::Sway)));
        assert!(!config.is_gnome(Some(DesktopEnvironment::Kde)));
        assert!(!config.is_kde(None));
    }

    #[test]
    fn test_defaults_follow_env_timeouts() {
        temp_env::with_var("CAPCHAIN_CLI_TIMEOUT_MS", Some("1500"), || {
            assert_eq!(ChainConfig::default().cli_timeout_ms, 1500);
        });
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ChainConfig =
            serde_json::from_str(r#"{"gnome_desktops": ["GNOME"], "temp_dir": "/var/tmp"}"#)
                .unwrap();

        assert_eq!(config.gnome_desktops, vec![DesktopEnvironment::Gnome]);
        assert_eq!(config.kde_desktops, ChainConfig::default().kde_desktops);
        assert_eq!(config.temp_root(), PathBuf::from("/var/tmp"));
    }

    #[test]
    fn test_from_file_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ChainConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidParameter { ref parameter, .. } if parameter == "config"));
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let err = ChainConfig::from_file(Path::new("/nonexistent/capchain.json")).unwrap_err();
        assert!(matches!(err, CaptureError::IoError(_)));
    }
}
