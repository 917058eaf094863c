//! capchain-core: screen capture provider selection and fallback orchestration
//!
//! Screen capture on modern desktops is not one API. This library detects the
//! session (X11, Wayland, sandboxed, per-OS native), builds an ordered chain of
//! capture providers for it, and walks that chain per capture call until a
//! provider succeeds, the user cancels, or every provider has failed. Each
//! walk produces a [`DecisionTrace`](capture::trace::DecisionTrace) explaining
//! what was tried.
//!
//! The public entry point is [`CaptureBackend`](capture::CaptureBackend).

pub mod capture;
pub mod error;
pub mod model;
pub mod util;
