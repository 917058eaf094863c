//! Data models shared across the capture pipeline
//!
//! - Session, desktop and backend classification types
//! - Geometry ([`Region`]) and monitor records ([`MonitorInfo`])
//! - Capture intent ([`CaptureKind`], [`CaptureOptions`])
//! - Static capability records ([`BackendCapabilities`])

use serde::{Deserialize, Serialize};

/// Represents the display backend type for the current platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// No backend detected or not yet initialized
    None,
    /// Wayland display server (Linux)
    Wayland,
    /// X11 display server (Linux)
    X11,
    /// Windows desktop
    Windows,
    /// macOS desktop
    #[serde(rename = "macos")]
    MacOS,
}

impl BackendType {
    /// Returns the backend type as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::None => "none",
            BackendType::Wayland => "wayland",
            BackendType::X11 => "x11",
            BackendType::Windows => "windows",
            BackendType::MacOS => "macos",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of graphical session the process runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// X11 session (also the conservative default on Linux)
    X11,
    /// Wayland session
    Wayland,
    /// Non-Linux desktop with a single native compositor (Windows, macOS)
    Native,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::X11 => "x11",
            SessionType::Wayland => "wayland",
            SessionType::Native => "native",
        }
    }

    /// Maps the session onto the backend type used in errors and capabilities
    pub fn backend_type(&self) -> BackendType {
        match self {
            SessionType::X11 => BackendType::X11,
            SessionType::Wayland => BackendType::Wayland,
            SessionType::Native if cfg!(target_os = "windows") => BackendType::Windows,
            SessionType::Native if cfg!(target_os = "macos") => BackendType::MacOS,
            SessionType::Native => BackendType::None,
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desktop environments the detector recognises
///
/// Serialized as the upper-case identifiers used in `XDG_CURRENT_DESKTOP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesktopEnvironment {
    Gnome,
    Kde,
    Hyprland,
    Sway,
    Xfce,
    Mate,
    Cinnamon,
    Lxqt,
    Lxde,
}

impl DesktopEnvironment {
    /// Every recognised desktop, in detector table order
    pub const ALL: [DesktopEnvironment; 9] = [
        DesktopEnvironment::Gnome,
        DesktopEnvironment::Kde,
        DesktopEnvironment::Hyprland,
        DesktopEnvironment::Sway,
        DesktopEnvironment::Xfce,
        DesktopEnvironment::Mate,
        DesktopEnvironment::Cinnamon,
        DesktopEnvironment::Lxqt,
        DesktopEnvironment::Lxde,
    ];

    /// Returns the canonical upper-case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            DesktopEnvironment::Gnome => "GNOME",
            DesktopEnvironment::Kde => "KDE",
            DesktopEnvironment::Hyprland => "HYPRLAND",
            DesktopEnvironment::Sway => "SWAY",
            DesktopEnvironment::Xfce => "XFCE",
            DesktopEnvironment::Mate => "MATE",
            DesktopEnvironment::Cinnamon => "CINNAMON",
            DesktopEnvironment::Lxqt => "LXQT",
            DesktopEnvironment::Lxde => "LXDE",
        }
    }

    /// Matches one upper-cased desktop token, including known aliases
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "PLASMA" | "KDE-PLASMA" => return Some(DesktopEnvironment::Kde),
            "X-CINNAMON" => return Some(DesktopEnvironment::Cinnamon),
            _ => {}
        }
        Self::ALL.into_iter().find(|desktop| desktop.as_str() == token)
    }
}

impl std::fmt::Display for DesktopEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Environment classification produced by the detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system name ("linux", "windows", "macos", "unknown")
    pub os:         String,
    pub session:    SessionType,
    /// Recognised desktop environment, if any
    pub desktop:    Option<DesktopEnvironment>,
    /// Compositor signature ("HYPRLAND", "SWAY", "WAYLAND", "X11", "UNKNOWN", ...)
    pub compositor: String,
    /// Running inside Flatpak, Snap or another container
    pub sandboxed:  bool,
}

impl EnvironmentInfo {
    pub fn is_wayland(&self) -> bool {
        self.session == SessionType::Wayland
    }
}

/// Rectangular region in physical pixels
///
/// Width and height are signed so that caller mistakes (zero or negative
/// sizes) can be represented and rejected instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x:      i32,
    pub y:      i32,
    pub width:  i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when either dimension is zero or negative
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Returns the overlap of two regions, or `None` when they do not overlap
    ///
    /// # Examples
    ///
    /// ```
    /// use capchain_core::model::Region;
    ///
    /// let screen = Region::new(0, 0, 1920, 1080);
    /// let clipped = Region::new(1800, 1000, 400, 400).intersect(&screen).unwrap();
    /// assert_eq!(clipped, Region::new(1800, 1000, 120, 80));
    /// ```
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= i64::from(left) || bottom <= i64::from(top) {
            return None;
        }

        Some(Region::new(
            left,
            top,
            (right - i64::from(left)) as i32,
            (bottom - i64::from(top)) as i32,
        ))
    }

    /// Smallest region containing every region in the iterator
    pub fn union_all<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Option<Region> {
        let mut iter = regions.into_iter();
        let first = *iter.next()?;
        let (mut left, mut top, mut right, mut bottom) =
            (first.x, first.y, first.right(), first.bottom());
        for region in iter {
            left = left.min(region.x);
            top = top.min(region.y);
            right = right.max(region.right());
            bottom = bottom.max(region.bottom());
        }
        Some(Region::new(
            left,
            top,
            (right - i64::from(left)) as i32,
            (bottom - i64::from(top)) as i32,
        ))
    }
}

/// Capture intent supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Entire virtual desktop
    FullScreen,
    /// Currently focused window
    ActiveWindow,
    /// User-selected region (interactive where the mechanism supports it)
    Region,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::FullScreen => "full_screen",
            CaptureKind::ActiveWindow => "active_window",
            CaptureKind::Region => "region",
        }
    }

    /// Whether mechanisms must present their own selection UI
    pub fn is_interactive(&self) -> bool {
        matches!(self, CaptureKind::Region)
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call capture options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Include the mouse cursor where the mechanism supports it
    pub show_cursor:          bool,
    /// Include window decorations for window captures
    pub include_window_frame: bool,
}

impl CaptureOptions {
    pub fn with_cursor(mut self, show_cursor: bool) -> Self {
        self.show_cursor = show_cursor;
        self
    }

    pub fn with_window_frame(mut self, include_window_frame: bool) -> Self {
        self.include_window_frame = include_window_frame;
        self
    }
}

/// Opaque window identifier handed out by a window service
pub type WindowHandle = u64;

/// Per-monitor geometry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub id:             String,
    pub name:           String,
    pub is_primary:     bool,
    /// Physical bounds in virtual-desktop coordinates
    pub bounds:         Region,
    /// Bounds minus panels and docks
    pub working_area:   Region,
    pub scale_factor:   f64,
    /// Rotation in degrees (0, 90, 180, 270)
    pub rotation:       f32,
    /// Refresh rate in Hz
    pub refresh_rate:   f32,
    pub bits_per_pixel: u32,
}

impl MonitorInfo {
    /// Placeholder monitor used when nothing can be enumerated
    pub fn default_display() -> Self {
        Self {
            id:             "0".to_string(),
            name:           "Default Display".to_string(),
            is_primary:     true,
            bounds:         Region::new(0, 0, 1920, 1080),
            working_area:   Region::new(0, 0, 1920, 1040),
            scale_factor:   1.0,
            rotation:       0.0,
            refresh_rate:   60.0,
            bits_per_pixel: 32,
        }
    }
}

/// Bounds of the virtual desktop spanned by `monitors`
pub fn virtual_bounds(monitors: &[MonitorInfo]) -> Option<Region> {
    Region::union_all(monitors.iter().map(|monitor| &monitor.bounds))
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width:  u32,
    pub height: u32,
}

/// Largest capture any backend is expected to produce
pub const MAX_CAPTURE_RESOLUTION: Size = Size {
    width:  16384,
    height: 16384,
};

/// Static feature record for the active capture mechanism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    pub backend_name:                   String,
    pub version:                        String,
    pub supports_hardware_acceleration: bool,
    pub supports_cursor_capture:        bool,
    pub supports_hdr:                   bool,
    pub supports_per_monitor_dpi:       bool,
    pub supports_monitor_hotplug:       bool,
    pub max_capture_resolution:         Size,
    pub requires_permission:            bool,
}

impl BackendCapabilities {
    /// Conservative record for mechanisms that shell out to external tools
    pub fn cli(backend_name: impl Into<String>) -> Self {
        Self {
            backend_name:                   backend_name.into(),
            version:                        env!("CARGO_PKG_VERSION").to_string(),
            supports_hardware_acceleration: false,
            supports_cursor_capture:        false,
            supports_hdr:                   false,
            supports_per_monitor_dpi:       false,
            supports_monitor_hotplug:       false,
            max_capture_resolution:         MAX_CAPTURE_RESOLUTION,
            requires_permission:            false,
        }
    }
}

/// Monitor topology change forwarded from the active capture mechanism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationChanged {
    /// Monitors after the change
    pub monitors: Vec<MonitorInfo>,
}
