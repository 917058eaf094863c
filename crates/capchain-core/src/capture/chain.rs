//! Single-success-wins chain walk
//!
//! [`ChainWalk`] records one [`DecisionStep`](super::trace::DecisionStep) per
//! candidate and decides when the walk is over. The async Linux orchestrator
//! and the synchronous Windows/macOS strategy selection both drive it, so the
//! terminal rules live in exactly one place:
//!
//! - `Succeeded` ends the walk with a value
//! - `Cancelled` ends the walk with no value, and nothing further is tried
//! - `Skipped` and `Failed` move on to the next candidate
//!
//! Running past the last candidate is exhaustion.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use super::trace::{DecisionOutcome, DecisionTrace};

/// Coarse ordering bucket for capture mechanisms
///
/// Lower stages are tried first. The derived `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// XDG desktop portal
    Portal,
    /// Desktop-specific D-Bus screenshot services (GNOME Shell, KWin)
    DesktopDbus,
    /// wlroots-style Wayland screencopy tools
    WaylandProtocol,
    /// Direct capture: X11 on Linux, the OS API elsewhere
    Native,
    /// External screenshot executables
    CliFallback,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Portal,
        Stage::DesktopDbus,
        Stage::WaylandProtocol,
        Stage::Native,
        Stage::CliFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Portal => "portal",
            Stage::DesktopDbus => "desktop-dbus",
            Stage::WaylandProtocol => "wayland-protocol",
            Stage::Native => "native",
            Stage::CliFallback => "cli-fallback",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened when one candidate was considered
#[derive(Debug)]
pub enum Attempt<T> {
    /// Not applicable; carries the reason
    Skipped(String),
    /// Tried and produced nothing
    Failed(Option<String>),
    /// Cancelled by the user or the caller
    Cancelled(Option<String>),
    /// Produced a value
    Succeeded(T),
}

/// Terminal state of a walk
#[derive(Debug)]
pub enum WalkOutcome<T> {
    Succeeded { provider_id: String, value: T },
    Cancelled { provider_id: String },
    Exhausted,
}

/// Step recorder shared by every chain-shaped selection
#[derive(Debug)]
pub struct ChainWalk {
    trace: DecisionTrace,
}

impl ChainWalk {
    /// Starts a walk with an empty trace labelled `label`
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            trace: DecisionTrace::new(label),
        }
    }

    /// Records one candidate and reports whether the walk is over
    ///
    /// `Break` carries the terminal outcome. The trace is sealed at that
    /// point and further steps are ignored.
    pub fn step<T>(
        &mut self,
        stage: Stage,
        provider_id: &str,
        attempt: Attempt<T>,
    ) -> ControlFlow<WalkOutcome<T>> {
        let (outcome, reason, terminal) = match attempt {
            Attempt::Skipped(reason) => (DecisionOutcome::Skipped, Some(reason), None),
            Attempt::Failed(reason) => (DecisionOutcome::Failed, reason, None),
            Attempt::Cancelled(reason) => (
                DecisionOutcome::Cancelled,
                reason,
                Some(WalkOutcome::Cancelled {
                    provider_id: provider_id.to_string(),
                }),
            ),
            Attempt::Succeeded(value) => (
                DecisionOutcome::Succeeded,
                None,
                Some(WalkOutcome::Succeeded {
                    provider_id: provider_id.to_string(),
                    value,
                }),
            ),
        };

        tracing::debug!(
            "[{}] {} ({}) -> {}{}",
            self.trace.label(),
            provider_id,
            stage,
            outcome,
            reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
        );
        self.trace.push(stage, provider_id, outcome, reason);

        match terminal {
            Some(done) => {
                self.trace.complete(outcome, Some(provider_id));
                ControlFlow::Break(done)
            }
            None => ControlFlow::Continue(()),
        }
    }

    /// Seals the trace as failed after the last candidate
    pub fn exhaust<T>(&mut self) -> WalkOutcome<T> {
        self.trace.complete(DecisionOutcome::Failed, None);
        WalkOutcome::Exhausted
    }

    pub fn trace(&self) -> &DecisionTrace {
        &self.trace
    }

    pub fn into_trace(self) -> DecisionTrace {
        self.trace
    }
}
