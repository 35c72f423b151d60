//! Point-in-time reconstruction by replaying the delta log.
//!
//! [`reconstruct_from_deltas`] folds an ordered delta sequence over the
//! empty base state (step 0, grid view, empty stack, no data, no template):
//!
//! - a data snapshot replaces data and meta
//! - a template replaces the template
//! - a view change replaces view and stack
//! - a rollback delta replaces all three zones, including clearing the
//!   template when it carries none
//!
//! Deltas without a snapshot (empty results, audit entries) only advance the
//! step. [`verify_deltas`] audits a stored log against its state row.

use std::collections::BTreeSet;

use serde::Serialize;
use vitrine_core::{Delta, DeltaType, SessionState, StateCurrent, ViewSnapshot, ViewState};

use crate::checksum::verify_checksum;
use crate::errors::{Result, StateError};

/// Zones rebuilt from a delta prefix.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedState {
    /// Session the deltas belong to.
    pub session_id: String,
    /// Step of the last applied delta (0 when none).
    pub step: i64,
    /// Data and Template zones.
    pub current: StateCurrent,
    /// View zone.
    pub view: ViewState,
    /// Navigation stack.
    pub view_stack: Vec<ViewSnapshot>,
    /// Deltas applied.
    pub applied: usize,
}

impl ReconstructedState {
    /// Empty base state for a session.
    pub fn base(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Apply one delta.
    pub fn apply(&mut self, delta: &Delta) {
        if let Some(snapshot) = &delta.data {
            self.current.data = snapshot.data.clone();
            self.current.meta = snapshot.meta.clone();
        }
        if delta.delta_type == DeltaType::Rollback {
            self.current.template = delta.template.clone();
        } else if let Some(template) = &delta.template {
            self.current.template = Some(template.clone());
        }
        if let Some(change) = &delta.view {
            self.view = change.view.clone();
            self.view_stack = change.stack.clone();
        }
        self.step = delta.step;
        self.applied += 1;
    }

    /// Whether the zones and step equal those of a stored state.
    pub fn matches(&self, state: &SessionState) -> bool {
        self.step == state.step
            && self.current == state.current
            && self.view == state.view
            && self.view_stack == state.view_stack
    }
}

/// Replay `deltas` (ascending by step, all for `session_id`) from the base.
pub fn reconstruct_from_deltas(session_id: &str, deltas: &[Delta]) -> Result<ReconstructedState> {
    let mut state = ReconstructedState::base(session_id);
    for delta in deltas {
        if delta.session_id != session_id {
            return Err(StateError::InvalidOperation(format!(
                "delta at step {} belongs to session {}, not {session_id}",
                delta.step, delta.session_id
            )));
        }
        if delta.step <= state.step {
            return Err(StateError::InvalidOperation(format!(
                "deltas out of order: step {} after step {}",
                delta.step, state.step
            )));
        }
        state.apply(delta);
    }
    Ok(state)
}

/// Result of auditing a session's delta log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// Session audited.
    pub session_id: String,
    /// Deltas in the log.
    pub delta_count: usize,
    /// Highest step in the log.
    pub latest_step: i64,
    /// Step recorded on the state row.
    pub state_step: i64,
    /// Steps in `1..=latest_step` with no delta.
    pub missing_steps: Vec<i64>,
    /// Steps whose stored checksum does not match (or is absent).
    pub checksum_failures: Vec<i64>,
    /// Whether replaying the whole log reproduces the stored zones.
    pub replay_matches: bool,
}

impl VerifyReport {
    /// Whether every check passed.
    pub fn is_ok(&self) -> bool {
        self.missing_steps.is_empty()
            && self.checksum_failures.is_empty()
            && self.latest_step == self.state_step
            && self.replay_matches
    }
}

/// Audit a full delta log against the stored state.
pub fn verify_deltas(state: &SessionState, deltas: &[Delta]) -> Result<VerifyReport> {
    let latest_step = deltas.last().map_or(0, |d| d.step);
    let present: BTreeSet<i64> = deltas.iter().map(|d| d.step).collect();
    let missing_steps = (1..=latest_step).filter(|s| !present.contains(s)).collect();

    let mut checksum_failures = Vec::new();
    for delta in deltas {
        if !verify_checksum(delta)? {
            checksum_failures.push(delta.step);
        }
    }

    let replay_matches = reconstruct_from_deltas(&state.session_id, deltas)
        .is_ok_and(|replayed| replayed.matches(state));

    Ok(VerifyReport {
        session_id: state.session_id.clone(),
        delta_count: deltas.len(),
        latest_step,
        state_step: state.step,
        missing_steps,
        checksum_failures,
        replay_matches,
    })
}
