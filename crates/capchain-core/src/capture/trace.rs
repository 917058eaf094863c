//! Decision trace for one capture call
//!
//! The trace is append-only: steps are pushed in the order providers were
//! considered and the trace is sealed once with the final outcome. It is
//! meant for logs and support diagnostics, never for end-user display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chain::Stage;

/// Outcome of one step, or of the whole walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Provider not applicable to this request/context
    Skipped,
    /// Provider tried and produced no bitmap
    Failed,
    /// User or caller cancelled; terminal for the chain
    Cancelled,
    /// Provider produced a bitmap; terminal for the chain
    Succeeded,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Skipped => "skipped",
            DecisionOutcome::Failed => "failed",
            DecisionOutcome::Cancelled => "cancelled",
            DecisionOutcome::Succeeded => "succeeded",
        }
    }
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One provider consideration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionStep {
    pub stage:       Stage,
    pub provider_id: String,
    pub outcome:     DecisionOutcome,
    pub reason:      Option<String>,
    pub at:          DateTime<Utc>,
}

/// Ordered record of every step taken during one capture call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTrace {
    label:             String,
    started_at:        DateTime<Utc>,
    steps:             Vec<DecisionStep>,
    final_provider_id: Option<String>,
    final_outcome:     Option<DecisionOutcome>,
    completed_at:      Option<DateTime<Utc>>,
}

impl DecisionTrace {
    /// Starts an empty trace; `label` names what is being decided
    /// (a capture kind, or strategy selection)
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label:             label.into(),
            started_at:        Utc::now(),
            steps:             Vec::new(),
            final_provider_id: None,
            final_outcome:     None,
            completed_at:      None,
        }
    }

    /// Appends a step. Steps pushed after completion are ignored.
    pub(crate) fn push(
        &mut self,
        stage: Stage,
        provider_id: &str,
        outcome: DecisionOutcome,
        reason: Option<String>,
    ) {
        if self.is_complete() {
            tracing::warn!("Ignoring step for {} on a completed trace", provider_id);
            return;
        }
        self.steps.push(DecisionStep {
            stage,
            provider_id: provider_id.to_string(),
            outcome,
            reason,
            at: Utc::now(),
        });
    }

    /// Seals the trace. Only the first call has an effect.
    pub(crate) fn complete(&mut self, outcome: DecisionOutcome, provider_id: Option<&str>) {
        if self.is_complete() {
            return;
        }
        self.final_outcome = Some(outcome);
        self.final_provider_id = provider_id.map(str::to_string);
        self.completed_at = Some(Utc::now());
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn steps(&self) -> &[DecisionStep] {
        &self.steps
    }

    /// Provider that ended the walk with success or cancellation
    pub fn final_provider_id(&self) -> Option<&str> {
        self.final_provider_id.as_deref()
    }

    pub fn final_outcome(&self) -> Option<DecisionOutcome> {
        self.final_outcome
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.final_outcome.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Provider ids in the order they were considered
    pub fn provider_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.provider_id.as_str()).collect()
    }

    /// Ids of the providers that were actually invoked (not skipped)
    pub fn attempted_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|step| step.outcome != DecisionOutcome::Skipped)
            .map(|step| step.provider_id.as_str())
            .collect()
    }

    /// One-line rendering, e.g. `portal:skipped -> x11:failed -> cli:succeeded`
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return "(no steps)".to_string();
        }
        self.steps
            .iter()
            .map(|step| format!("{}:{}", step.provider_id, step.outcome))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
