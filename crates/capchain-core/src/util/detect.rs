//! Environment detection
//!
//! Classifies the session type, desktop environment, compositor and sandbox
//! status from environment variables alone. Detection never fails: missing or
//! unrecognised values produce the most conservative answer (X11, no desktop,
//! not sandboxed).

use std::env;

use crate::model::{DesktopEnvironment, EnvironmentInfo, SessionType};

/// Compositor label when a Wayland session has no recognised signature
pub const COMPOSITOR_WAYLAND: &str = "WAYLAND";
/// Compositor label when a Wayland session has no display socket either
pub const COMPOSITOR_UNKNOWN: &str = "UNKNOWN";
pub const COMPOSITOR_X11: &str = "X11";
pub const COMPOSITOR_NATIVE: &str = "NATIVE";

/// Detects the current session, desktop, compositor and sandbox status
///
/// # Platform-specific behavior
///
/// ## Linux
/// - Session: `XDG_SESSION_TYPE`, then `WAYLAND_DISPLAY`, else X11
/// - Desktop: `XDG_CURRENT_DESKTOP`, `XDG_SESSION_DESKTOP`, `DESKTOP_SESSION`
/// - Compositor (Wayland only): `HYPRLAND_INSTANCE_SIGNATURE`, `SWAYSOCK`
/// - Sandbox: `FLATPAK_ID`, `SNAP`, `container`
///
/// ## Windows / macOS
/// - Session is [`SessionType::Native`], no desktop id, never sandboxed
///
/// # Examples
///
/// ```
/// use capchain_core::util::detect::detect_environment;
///
/// let info = detect_environment();
/// println!("{} session on {}", info.session, info.os);
/// ```
pub fn detect_environment() -> EnvironmentInfo {
    detect_environment_with_env(|key| env::var(key).ok())
}

/// Detection with an injected environment lookup
///
/// Empty values are treated as unset.
pub fn detect_environment_with_env<F>(env_provider: F) -> EnvironmentInfo
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env_provider(key).filter(|value| !value.trim().is_empty());

    if cfg!(any(target_os = "windows", target_os = "macos")) {
        return EnvironmentInfo {
            os:         env::consts::OS.to_string(),
            session:    SessionType::Native,
            desktop:    None,
            compositor: COMPOSITOR_NATIVE.to_string(),
            sandboxed:  false,
        };
    }

    let os = if cfg!(target_os = "linux") {
        "linux".to_string()
    } else {
        "unknown".to_string()
    };

    let session = detect_session(&lookup);
    let desktop = detect_desktop(&lookup);
    let compositor = detect_compositor(session, &lookup);
    let sandboxed = detect_sandbox(&lookup);

    EnvironmentInfo {
        os,
        session,
        desktop,
        compositor,
        sandboxed,
    }
}

fn detect_session<F>(lookup: &F) -> SessionType
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(session_type) = lookup("XDG_SESSION_TYPE") {
        match session_type.trim().to_ascii_lowercase().as_str() {
            "wayland" => return SessionType::Wayland,
            "x11" => return SessionType::X11,
            _ => {}
        }
    }

    if lookup("WAYLAND_DISPLAY").is_some() {
        return SessionType::Wayland;
    }

    SessionType::X11
}

/// First recognised token of the first non-empty desktop variable
fn detect_desktop<F>(lookup: &F) -> Option<DesktopEnvironment>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = ["XDG_CURRENT_DESKTOP", "XDG_SESSION_DESKTOP", "DESKTOP_SESSION"]
        .into_iter()
        .find_map(lookup)?;

    raw.split(':')
        .map(|token| token.trim().to_ascii_uppercase())
        .find_map(|token| DesktopEnvironment::from_token(&token))
}

fn detect_compositor<F>(session: SessionType, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if session != SessionType::Wayland {
        return COMPOSITOR_X11.to_string();
    }

    if lookup("HYPRLAND_INSTANCE_SIGNATURE").is_some() {
        return DesktopEnvironment::Hyprland.as_str().to_string();
    }
    if lookup("SWAYSOCK").is_some() {
        return DesktopEnvironment::Sway.as_str().to_string();
    }
    if lookup("WAYLAND_DISPLAY").is_some() {
        return COMPOSITOR_WAYLAND.to_string();
    }

    COMPOSITOR_UNKNOWN.to_string()
}

fn detect_sandbox<F>(lookup: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    ["FLATPAK_ID", "SNAP", "container"]
        .into_iter()
        .any(|key| lookup(key).is_some())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Helper function to create a mock environment provider
    fn mock_env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_empty_environment_is_conservative() {
        let info = detect_environment_with_env(mock_env(&[]));

        assert_eq!(info.os, "linux");
        assert_eq!(info.session, SessionType::X11);
        assert_eq!(info.desktop, None);
        assert_eq!(info.compositor, "X11");
        assert!(!info.sandboxed);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_session_type_variable_wins() {
        let info = detect_environment_with_env(mock_env(&[
            ("XDG_SESSION_TYPE", "x11"),
            ("WAYLAND_DISPLAY", "wayland-0"),
        ]));
        assert_eq!(info.session, SessionType::X11);

        let info = detect_environment_with_env(mock_env(&[("XDG_SESSION_TYPE", "Wayland")]));
        assert_eq!(info.session, SessionType::Wayland);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_wayland_display_fallback() {
        let info = detect_environment_with_env(mock_env(&[
            ("XDG_SESSION_TYPE", "tty"),
            ("WAYLAND_DISPLAY", "wayland-1"),
        ]));
        assert_eq!(info.session, SessionType::Wayland);
        assert_eq!(info.compositor, "WAYLAND");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_desktop_colon_list_first_match() {
        let info =
            detect_environment_with_env(mock_env(&[("XDG_CURRENT_DESKTOP", "ubuntu:GNOME")]));
        assert_eq!(info.desktop, Some(DesktopEnvironment::Gnome));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_desktop_aliases_and_case() {
        let info = detect_environment_with_env(mock_env(&[("XDG_CURRENT_DESKTOP", "plasma")]));
        assert_eq!(info.desktop, Some(DesktopEnvironment::Kde));

        let info =
            detect_environment_with_env(mock_env(&[("XDG_CURRENT_DESKTOP", "X-Cinnamon")]));
        assert_eq!(info.desktop, Some(DesktopEnvironment::Cinnamon));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_desktop_falls_back_to_session_variables() {
        let info = detect_environment_with_env(mock_env(&[
            ("XDG_CURRENT_DESKTOP", ""),
            ("XDG_SESSION_DESKTOP", "xfce"),
        ]));
        assert_eq!(info.desktop, Some(DesktopEnvironment::Xfce));

        let info = detect_environment_with_env(mock_env(&[("DESKTOP_SESSION", "lxqt")]));
        assert_eq!(info.desktop, Some(DesktopEnvironment::Lxqt));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_unrecognised_desktop_is_none() {
        let info = detect_environment_with_env(mock_env(&[("XDG_CURRENT_DESKTOP", "Unity")]));
        assert_eq!(info.desktop, None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_compositor_signatures() {
        let info = detect_environment_with_env(mock_env(&[
            ("XDG_SESSION_TYPE", "wayland"),
            ("HYPRLAND_INSTANCE_SIGNATURE", "abc"),
            ("SWAYSOCK", "/run/user/1000/sway.sock"),
        ]));
        assert_eq!(info.compositor, "HYPRLAND");

        let info = detect_environment_with_env(mock_env(&[
            ("XDG_SESSION_TYPE", "wayland"),
            ("SWAYSOCK", "/run/user/1000/sway.sock"),
        ]));
        assert_eq!(info.compositor, "SWAY");

        let info = detect_environment_with_env(mock_env(&[("XDG_SESSION_TYPE", "wayland")]));
        assert_eq!(info.compositor, "UNKNOWN");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_compositor_ignored_on_x11() {
        let info = detect_environment_with_env(mock_env(&[
            ("XDG_SESSION_TYPE", "x11"),
            ("HYPRLAND_INSTANCE_SIGNATURE", "abc"),
        ]));
        assert_eq!(info.compositor, "X11");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_sandbox_markers() {
        for key in ["FLATPAK_ID", "SNAP", "container"] {
            let info = detect_environment_with_env(mock_env(&[(key, "x")]));
            assert!(info.sandboxed, "{key} should mark the session sandboxed");
        }

        let info = detect_environment_with_env(mock_env(&[("FLATPAK_ID", "")]));
        assert!(!info.sandboxed);
    }

    #[test]
    #[cfg(any(target_os = "windows", target_os = "macos"))]
    fn test_native_platforms() {
        let info = detect_environment_with_env(mock_env(&[("XDG_SESSION_TYPE", "wayland")]));
        assert_eq!(info.session, SessionType::Native);
        assert_eq!(info.desktop, None);
        assert!(!info.sandboxed);
    }

    #[test]
    fn test_detect_environment_public_api() {
        let info = detect_environment();
        assert!(!info.os.is_empty());
        assert!(!info.compositor.is_empty());
    }
}
