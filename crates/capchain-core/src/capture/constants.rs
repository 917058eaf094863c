//! Timeout constants for capture mechanisms
//!
//! # Runtime Configuration
//!
//! Every timeout can be overridden through the environment:
//!
//! | Environment Variable | Default | Description |
//! |---------------------|---------|-------------|
//! | `CAPCHAIN_CLI_TIMEOUT_MS` | 10000 | Non-interactive screenshot tool |
//! | `CAPCHAIN_CLI_INTERACTIVE_TIMEOUT_MS` | 60000 | Tool showing its own selection UI |
//! | `CAPCHAIN_PORTAL_TIMEOUT_SECS` | 60 | Screenshot portal request |
//! | `CAPCHAIN_DBUS_TIMEOUT_MS` | 10000 | GNOME Shell / KWin capture call |
//! | `CAPCHAIN_X11_CAPTURE_TIMEOUT_MS` | 5000 | Direct X11 capture via xcap |
//!
//! Values that fail to parse fall back to the default.

/// Bound for a screenshot tool that captures without user interaction.
///
/// Used by: CLI runner (gnome-screenshot -f, scrot, grim, screencapture)
pub const CLI_TIMEOUT_MS: u64 = 10_000;

/// Bound for a screenshot tool that presents its own selection UI.
///
/// The user needs time to drag a rectangle or pick a window.
///
/// Used by: CLI runner (gnome-screenshot -a, spectacle -r, slurp)
pub const CLI_INTERACTIVE_TIMEOUT_MS: u64 = 60_000;

/// Bound for a screenshot portal request, which may show a dialog.
pub const PORTAL_TIMEOUT_SECS: u64 = 60;

/// Portal timeout in milliseconds.
pub const PORTAL_TIMEOUT_MS: u64 = PORTAL_TIMEOUT_SECS * 1000;

/// Bound for desktop-native D-Bus capture calls.
pub const DBUS_TIMEOUT_MS: u64 = 10_000;

/// Bound for a direct X11 capture through xcap.
pub const X11_CAPTURE_TIMEOUT_MS: u64 = 5_000;

/// How long KWin gets to finish writing raw pixels into the handed-over file.
pub const KWIN_WRITE_TIMEOUT_MS: u64 = 3_000;

// =============================================================================
// Environment Variable Overrides
// =============================================================================

/// Helper to get a timeout from environment variable or fall back to default.
fn get_timeout_from_env(env_var: &str, default: u64) -> u64 {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Override with: `CAPCHAIN_CLI_TIMEOUT_MS`
pub fn cli_timeout_ms() -> u64 {
    get_timeout_from_env("CAPCHAIN_CLI_TIMEOUT_MS", CLI_TIMEOUT_MS)
}

/// Override with: `CAPCHAIN_CLI_INTERACTIVE_TIMEOUT_MS`
pub fn cli_interactive_timeout_ms() -> u64 {
    get_timeout_from_env("CAPCHAIN_CLI_INTERACTIVE_TIMEOUT_MS", CLI_INTERACTIVE_TIMEOUT_MS)
}

/// Override with: `CAPCHAIN_PORTAL_TIMEOUT_SECS`
pub fn portal_timeout_secs() -> u64 {
    get_timeout_from_env("CAPCHAIN_PORTAL_TIMEOUT_SECS", PORTAL_TIMEOUT_SECS)
}

pub fn portal_timeout_ms() -> u64 {
    portal_timeout_secs() * 1000
}

/// Override with: `CAPCHAIN_DBUS_TIMEOUT_MS`
pub fn dbus_timeout_ms() -> u64 {
    get_timeout_from_env("CAPCHAIN_DBUS_TIMEOUT_MS", DBUS_TIMEOUT_MS)
}

/// Override with: `CAPCHAIN_X11_CAPTURE_TIMEOUT_MS`
pub fn x11_capture_timeout_ms() -> u64 {
    get_timeout_from_env("CAPCHAIN_X11_CAPTURE_TIMEOUT_MS", X11_CAPTURE_TIMEOUT_MS)
}
