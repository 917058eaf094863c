//! Linux capture providers
//!
//! | id | stage | applies when |
//! |----|-------|--------------|
//! | `portal` | Portal | sandboxed, or portal present and (Wayland or modern capture) |
//! | `kde-dbus` | DesktopDbus | not sandboxed, modern capture, KDE-family desktop |
//! | `gnome-dbus` | DesktopDbus | not sandboxed, modern capture, GNOME-family desktop |
//! | `wlroots` | WaylandProtocol | Wayland, not sandboxed, wlroots compositor |
//! | `x11` | Native | not Wayland, not sandboxed |
//! | `cli` | CliFallback | not Wayland, not sandboxed |

use std::sync::Arc;

use super::{config::ChainConfig, provider::CaptureProvider, runtime::LinuxCaptureRuntime};

pub mod cli;
pub mod gnome_dbus;
pub mod kde_dbus;
pub mod portal;
pub mod wlroots;
pub mod x11;

pub use cli::{CLI_PROVIDER_ID, CliProvider};
pub use gnome_dbus::{GNOME_DBUS_PROVIDER_ID, GnomeDbusProvider};
pub use kde_dbus::{KDE_DBUS_PROVIDER_ID, KdeDbusProvider};
pub use portal::{PORTAL_PROVIDER_ID, PortalProvider};
pub use wlroots::{WLROOTS_PROVIDER_ID, WlrootsProvider};
pub use x11::{X11_PROVIDER_ID, X11Provider};

/// The standard Linux chain, in registration order
pub fn default_linux_chain(
    runtime: Arc<dyn LinuxCaptureRuntime>,
    config: &ChainConfig,
) -> Vec<Arc<dyn CaptureProvider>> {
    vec![
        Arc::new(PortalProvider::new(runtime.clone())),
        Arc::new(KdeDbusProvider::new(runtime.clone(), config.kde_desktops.clone())),
        Arc::new(GnomeDbusProvider::new(runtime.clone(), config.gnome_desktops.clone())),
        Arc::new(WlrootsProvider::new(runtime.clone(), config.wlroots_desktops.clone())),
        Arc::new(X11Provider::new(runtime.clone())),
        Arc::new(CliProvider::new(runtime)),
    ]
}
