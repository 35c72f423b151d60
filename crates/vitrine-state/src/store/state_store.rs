//! The Zone-Write Coordinator.
//!
//! Every mutation goes through one commit path: open an `IMMEDIATE`
//! transaction, load the state, plan the change, append the delta at the
//! next step, write the zone, commit. A plan that yields nothing (popping an
//! empty stack) rolls back without consuming a step. Contention on the write
//! lock or the `(session_id, step)` key retries with linear backoff up to
//! [`StoreOptions::max_step_retries`] attempts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};
use vitrine_core::delta::paths;
use vitrine_core::{
    Action, ActionType, Clock, DataPayload, DataSnapshot, Delta, DeltaInfo, DeltaSource,
    DeltaType, Formation, IdGenerator, ResultMeta, SessionState, StateCurrent, StateData,
    StateMeta, SystemClock, UuidIds, ViewChange, ViewSnapshot, ViewState,
};

use super::options::StoreOptions;
use super::validation::{validate_data, validate_template, validate_view};
use crate::checksum::delta_checksum;
use crate::errors::{Result, StateError, is_contention};
use crate::reconstruct::{ReconstructedState, VerifyReport, reconstruct_from_deltas, verify_deltas};
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::repositories::{DeltaRepo, StateRepo, StepRange};

/// Rollback target and who asked for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollbackRequest {
    /// Step whose state is restored (`0` restores the empty state).
    pub to_step: i64,
    /// Who requested the rollback.
    pub source: DeltaSource,
    /// Requesting actor.
    pub actor_id: String,
}

impl RollbackRequest {
    /// Engine-initiated rollback to `to_step`.
    pub fn to(to_step: i64) -> Self {
        Self {
            to_step,
            source: DeltaSource::System,
            actor_id: "system".to_string(),
        }
    }

    /// Attribute the rollback to an actor.
    #[must_use]
    pub fn by(mut self, source: DeltaSource, actor_id: impl Into<String>) -> Self {
        self.source = source;
        self.actor_id = actor_id.into();
        self
    }
}

/// Result of a rollback.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    /// State after the rollback.
    pub state: SessionState,
    /// Step current before the rollback.
    pub from_step: i64,
    /// Step whose zones were restored.
    pub to_step: i64,
    /// Deltas undone (`from_step - to_step`).
    pub rolled_back: i64,
    /// The appended rollback delta.
    pub delta: Delta,
}

/// Zone columns a committed delta writes.
enum ZoneUpdate {
    /// Only the step advances.
    Step,
    Data {
        data: StateData,
        meta: StateMeta,
    },
    Meta(StateMeta),
    Template(Option<Formation>),
    View {
        view: ViewState,
        stack: Vec<ViewSnapshot>,
    },
    Stack(Vec<ViewSnapshot>),
    /// Every zone (rollback).
    All {
        current: StateCurrent,
        view: ViewState,
        stack: Vec<ViewSnapshot>,
    },
}

impl ZoneUpdate {
    fn apply(&self, conn: &Connection, session_id: &str, step: i64, now: DateTime<Utc>) -> Result<bool> {
        match self {
            Self::Step => StateRepo::update_step(conn, session_id, step, now),
            Self::Data { data, meta } => StateRepo::update_data(conn, session_id, data, meta, step, now),
            Self::Meta(meta) => StateRepo::update_meta(conn, session_id, meta, step, now),
            Self::Template(template) => {
                StateRepo::update_template(conn, session_id, template.as_ref(), step, now)
            }
            Self::View { view, stack } => StateRepo::update_view(conn, session_id, view, stack, step, now),
            Self::Stack(stack) => StateRepo::update_stack(conn, session_id, stack, step, now),
            Self::All {
                current,
                view,
                stack,
            } => {
                let _ = StateRepo::update_data(conn, session_id, &current.data, &current.meta, step, now)?;
                let _ = StateRepo::update_template(conn, session_id, current.template.as_ref(), step, now)?;
                StateRepo::update_view(conn, session_id, view, stack, step, now)
            }
        }
    }
}

/// A planned mutation: the delta to append, the zone write, and a value
/// handed back to the caller once committed.
struct Planned<T> {
    delta: Delta,
    update: ZoneUpdate,
    output: T,
}

impl<T> Planned<T> {
    fn new(delta: Delta, update: ZoneUpdate, output: T) -> Self {
        Self {
            delta,
            update,
            output,
        }
    }
}

/// A committed mutation.
struct Committed<T> {
    delta: Delta,
    output: T,
}

/// Transactional zone-state store.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and borrows a
/// pooled connection for its duration.
pub struct StateStore {
    pool: ConnectionPool,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    options: StoreOptions,
}

impl StateStore {
    /// Create a store with injected time and ID sources.
    pub fn new(
        pool: ConnectionPool,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        options: StoreOptions,
    ) -> Self {
        Self {
            pool,
            clock,
            ids,
            options,
        }
    }

    /// Create a store with the wall clock, UUID v7 IDs and default options.
    pub fn with_defaults(pool: ConnectionPool) -> Self {
        Self::new(
            pool,
            Arc::new(SystemClock),
            Arc::new(UuidIds),
            StoreOptions::default(),
        )
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Create the state for a new session at step 0.
    ///
    /// Fails with [`StateError::InvalidOperation`] if it already exists.
    pub fn create_state(&self, session_id: &str) -> Result<SessionState> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        if StateRepo::exists(&tx, session_id)? {
            return Err(StateError::InvalidOperation(format!(
                "state already exists for session {session_id}"
            )));
        }
        let state = SessionState::empty(self.ids.state_id(), session_id, self.clock.now());
        StateRepo::insert(&tx, &state)?;
        tx.commit()?;

        info!(session_id, state_id = %state.id, "session state created");
        Ok(state)
    }

    /// Return the existing state, creating it if absent.
    pub fn ensure_state(&self, session_id: &str) -> Result<SessionState> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        if let Some(existing) = StateRepo::load(&tx, session_id)? {
            return Ok(existing);
        }
        let state = SessionState::empty(self.ids.state_id(), session_id, self.clock.now());
        StateRepo::insert(&tx, &state)?;
        tx.commit()?;

        info!(session_id, state_id = %state.id, "session state created");
        Ok(state)
    }

    /// Delete the state and every delta of a session in one transaction.
    ///
    /// Returns whether a state existed.
    pub fn delete_state(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let deltas = DeltaRepo::delete_for_session(&tx, session_id)?;
        let existed = StateRepo::delete(&tx, session_id)?;
        tx.commit()?;

        if existed {
            info!(session_id, deltas, "session state deleted");
        }
        Ok(existed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Zone writes
    // ─────────────────────────────────────────────────────────────────────

    /// Write a search or filter result to the Data zone.
    ///
    /// With `result.count == 0` only the delta is appended and the previous
    /// data and meta stay exactly as they were. Otherwise data and meta are
    /// replaced; existing aliases carry forward and aliases in `result`
    /// override per key.
    pub fn write_data(
        &self,
        session_id: &str,
        data: DataPayload,
        result: ResultMeta,
        info: DeltaInfo,
    ) -> Result<i64> {
        validate_data(&data, &result)?;
        let empty = result.count == 0;
        let info = info.with_result(result.clone());

        let committed = self.commit_required(session_id, "data", |_, state, now| {
            let mut delta = info.clone().to_delta(session_id, 0, now);
            if empty {
                return Ok(Some(Planned::new(delta, ZoneUpdate::Step, ())));
            }
            let meta = StateMeta::carry_forward(&state.current.meta, &data, &result);
            delta.data = Some(DataSnapshot {
                data: data.clone(),
                meta: meta.clone(),
            });
            let update = ZoneUpdate::Data {
                data: data.clone(),
                meta,
            };
            Ok(Some(Planned::new(delta, update, ())))
        })?;

        let step = committed.delta.step;
        if empty {
            counter!("state_empty_results_total").increment(1);
            info!(session_id, step, "empty result, previous data kept");
        } else {
            debug!(session_id, step, count = result.count, "data zone written");
        }
        Ok(step)
    }

    /// Replace the Template zone.
    pub fn write_template(&self, session_id: &str, template: Formation, info: DeltaInfo) -> Result<i64> {
        validate_template(&template)?;

        let committed = self.commit_required(session_id, "template", |_, _, now| {
            let mut delta = info.clone().to_delta(session_id, 0, now);
            delta.template = Some(template.clone());
            Ok(Some(Planned::new(
                delta,
                ZoneUpdate::Template(Some(template.clone())),
                (),
            )))
        })?;

        let step = committed.delta.step;
        debug!(session_id, step, mode = %template.mode, widgets = template.widgets.len(), "template zone written");
        Ok(step)
    }

    /// Replace the View zone and the navigation stack.
    pub fn write_view(
        &self,
        session_id: &str,
        view: ViewState,
        stack: Vec<ViewSnapshot>,
        info: DeltaInfo,
    ) -> Result<i64> {
        validate_view(&view)?;

        let committed = self.commit_required(session_id, "view", |_, _, now| {
            let mut delta = info.clone().to_delta(session_id, 0, now);
            delta.view = Some(ViewChange {
                view: view.clone(),
                stack: stack.clone(),
            });
            let update = ZoneUpdate::View {
                view: view.clone(),
                stack: stack.clone(),
            };
            Ok(Some(Planned::new(delta, update, ())))
        })?;

        let step = committed.delta.step;
        debug!(session_id, step, mode = %view.mode, depth = stack.len(), "view zone written");
        Ok(step)
    }

    /// Push a snapshot onto the navigation stack.
    pub fn push_view(&self, session_id: &str, snapshot: ViewSnapshot) -> Result<i64> {
        let committed = self.commit_required(session_id, "stack", |_, state, now| {
            let mut stack = state.view_stack.clone();
            stack.push(snapshot.clone());
            let mut delta = stack_info(DeltaType::Push).to_delta(session_id, 0, now);
            delta.view = Some(ViewChange {
                view: state.view.clone(),
                stack: stack.clone(),
            });
            Ok(Some(Planned::new(delta, ZoneUpdate::Stack(stack), ())))
        })?;

        let step = committed.delta.step;
        debug!(session_id, step, mode = %snapshot.mode, "view pushed");
        Ok(step)
    }

    /// Pop the top of the navigation stack.
    ///
    /// Returns `None` on an empty stack; no delta is appended and the step
    /// does not move.
    pub fn pop_view(&self, session_id: &str) -> Result<Option<(ViewSnapshot, i64)>> {
        let committed = self.commit(session_id, "stack", |_, state, now| {
            let mut stack = state.view_stack.clone();
            let Some(top) = stack.pop() else {
                return Ok(None);
            };
            let mut delta = stack_info(DeltaType::Pop).to_delta(session_id, 0, now);
            delta.view = Some(ViewChange {
                view: state.view.clone(),
                stack: stack.clone(),
            });
            Ok(Some(Planned::new(delta, ZoneUpdate::Stack(stack), top)))
        })?;

        match committed {
            Some(c) => {
                debug!(session_id, step = c.delta.step, mode = %c.output.mode, "view popped");
                Ok(Some((c.output, c.delta.step)))
            }
            None => {
                debug!(session_id, "pop on empty view stack");
                Ok(None)
            }
        }
    }

    /// Merge alias bindings into the Data-zone meta without touching data.
    ///
    /// Supplied keys override existing ones; no existing key is removed.
    pub fn set_aliases(
        &self,
        session_id: &str,
        aliases: BTreeMap<String, String>,
        info: DeltaInfo,
    ) -> Result<i64> {
        let committed = self.commit_required(session_id, "meta", |_, state, now| {
            let mut meta = state.current.meta.clone();
            meta.aliases
                .extend(aliases.iter().map(|(k, v)| (k.clone(), v.clone())));

            let mut delta = info
                .clone()
                .with_result(ResultMeta {
                    count: meta.count,
                    fields: meta.fields.clone(),
                    aliases: aliases.clone(),
                })
                .to_delta(session_id, 0, now);
            delta.data = Some(DataSnapshot {
                data: state.current.data.clone(),
                meta: meta.clone(),
            });
            Ok(Some(Planned::new(delta, ZoneUpdate::Meta(meta), ())))
        })?;

        let step = committed.delta.step;
        debug!(session_id, step, keys = aliases.len(), "aliases merged");
        Ok(step)
    }

    /// Append an audit-only delta. No zone changes.
    pub fn append_delta(&self, session_id: &str, info: DeltaInfo) -> Result<i64> {
        let committed = self.commit_required(session_id, "audit", |_, _, now| {
            Ok(Some(Planned::new(
                info.clone().to_delta(session_id, 0, now),
                ZoneUpdate::Step,
                (),
            )))
        })?;
        Ok(committed.delta.step)
    }

    /// Restore the zones as they were at `to_step`.
    ///
    /// History is not rewritten: a `rollback` delta carrying every restored
    /// zone is appended at the next step. Aliases bound since `to_step` are
    /// kept.
    pub fn rollback(&self, session_id: &str, request: &RollbackRequest) -> Result<RollbackOutcome> {
        let to_step = request.to_step;
        let committed = self.commit_required(session_id, "state", |conn, state, now| {
            let from_step = state.step;
            if to_step < 0 || to_step >= from_step {
                return Err(StateError::InvalidOperation(format!(
                    "cannot roll back session {session_id} from step {from_step} to step {to_step}"
                )));
            }

            let deltas = DeltaRepo::load(conn, session_id, StepRange::until(to_step))?;
            let mut restored = reconstruct_from_deltas(session_id, &deltas)?;
            let mut aliases = restored.current.meta.aliases;
            aliases.extend(state.current.meta.aliases.clone());
            restored.current.meta.aliases = aliases;

            let mut info = DeltaInfo::system(
                DeltaType::Rollback,
                paths::STATE,
                Action::new(ActionType::Rollback)
                    .param("from_step", from_step)
                    .param("to_step", to_step),
            )
            .with_result(ResultMeta {
                count: restored.current.meta.count,
                fields: restored.current.meta.fields.clone(),
                aliases: BTreeMap::new(),
            });
            info.source = request.source;
            info.actor_id.clone_from(&request.actor_id);

            let mut delta = info.to_delta(session_id, 0, now);
            delta.data = Some(DataSnapshot {
                data: restored.current.data.clone(),
                meta: restored.current.meta.clone(),
            });
            delta.template.clone_from(&restored.current.template);
            delta.view = Some(ViewChange {
                view: restored.view.clone(),
                stack: restored.view_stack.clone(),
            });

            let after = SessionState {
                current: restored.current.clone(),
                view: restored.view.clone(),
                view_stack: restored.view_stack.clone(),
                updated_at: now,
                ..state.clone()
            };
            let update = ZoneUpdate::All {
                current: restored.current,
                view: restored.view,
                stack: restored.view_stack,
            };
            Ok(Some(Planned::new(delta, update, (from_step, after))))
        })?;

        let (from_step, mut state) = committed.output;
        state.step = committed.delta.step;
        counter!("state_rollbacks_total").increment(1);
        info!(session_id, from_step, to_step, step = state.step, "state rolled back");

        Ok(RollbackOutcome {
            state,
            from_step,
            to_step,
            rolled_back: from_step - to_step,
            delta: committed.delta,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Current state of a session.
    pub fn get_state(&self, session_id: &str) -> Result<SessionState> {
        let conn = self.conn()?;
        StateRepo::load(&conn, session_id)?
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))
    }

    /// Whether a session has state.
    pub fn state_exists(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        StateRepo::exists(&conn, session_id)
    }

    /// Sessions with state, oldest first.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        StateRepo::list_sessions(&conn)
    }

    /// The navigation stack, bottom first.
    pub fn get_view_stack(&self, session_id: &str) -> Result<Vec<ViewSnapshot>> {
        Ok(self.get_state(session_id)?.view_stack)
    }

    /// Latest step of a session (0 when it has no deltas).
    pub fn latest_step(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        DeltaRepo::max_step(&conn, session_id)
    }

    /// Every delta of a session, ascending by step.
    pub fn get_deltas(&self, session_id: &str) -> Result<Vec<Delta>> {
        self.load_deltas(session_id, StepRange::all())
    }

    /// Deltas with `step >= from_step`.
    pub fn get_deltas_since(&self, session_id: &str, from_step: i64) -> Result<Vec<Delta>> {
        self.load_deltas(session_id, StepRange::since(from_step))
    }

    /// Deltas with `step <= to_step`.
    pub fn get_deltas_until(&self, session_id: &str, to_step: i64) -> Result<Vec<Delta>> {
        self.load_deltas(session_id, StepRange::until(to_step))
    }

    /// Deltas recorded under one conversational turn.
    pub fn get_turn_deltas(&self, session_id: &str, turn_id: &str) -> Result<Vec<Delta>> {
        let conn = self.conn()?;
        DeltaRepo::load_turn(&conn, session_id, turn_id)
    }

    /// Zones as they were at `to_step`.
    pub fn reconstruct(&self, session_id: &str, to_step: i64) -> Result<ReconstructedState> {
        let deltas = self.get_deltas_until(session_id, to_step)?;
        reconstruct_from_deltas(session_id, &deltas)
    }

    /// Audit the delta log of a session against its state.
    pub fn verify_deltas(&self, session_id: &str) -> Result<VerifyReport> {
        let conn = self.conn()?;
        let state = StateRepo::load(&conn, session_id)?
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;
        let deltas = DeltaRepo::load(&conn, session_id, StepRange::all())?;
        verify_deltas(&state, &deltas)
    }

    fn load_deltas(&self, session_id: &str, range: StepRange) -> Result<Vec<Delta>> {
        let conn = self.conn()?;
        DeltaRepo::load(&conn, session_id, range)
    }

    // ─── Internal ───────────────────────────────────────────────────────

    fn commit_required<T>(
        &self,
        session_id: &str,
        zone: &'static str,
        plan: impl Fn(&Connection, &SessionState, DateTime<Utc>) -> Result<Option<Planned<T>>>,
    ) -> Result<Committed<T>> {
        self.commit(session_id, zone, plan)?.ok_or_else(|| {
            StateError::Internal(format!("{zone} write on session {session_id} planned no change"))
        })
    }

    fn commit<T>(
        &self,
        session_id: &str,
        zone: &'static str,
        plan: impl Fn(&Connection, &SessionState, DateTime<Utc>) -> Result<Option<Planned<T>>>,
    ) -> Result<Option<Committed<T>>> {
        let started = Instant::now();
        let max_attempts = self.options.max_step_retries.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.try_commit(session_id, &plan) {
                Ok(committed) => {
                    histogram!("state_write_duration_seconds", "zone" => zone)
                        .record(started.elapsed().as_secs_f64());
                    if committed.is_some() {
                        counter!("state_zone_writes_total", "zone" => zone).increment(1);
                    }
                    return Ok(committed);
                }
                Err(StateError::Sqlite(e)) if is_contention(&e) => {
                    counter!("state_step_conflicts_total").increment(1);
                    warn!(session_id, zone, attempt, error = %e, "write contention");
                    if attempt >= max_attempts {
                        return Err(StateError::ConcurrentWriteConflict {
                            session_id: session_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    std::thread::sleep(self.options.retry_backoff * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_commit<T>(
        &self,
        session_id: &str,
        plan: &impl Fn(&Connection, &SessionState, DateTime<Utc>) -> Result<Option<Planned<T>>>,
    ) -> Result<Option<Committed<T>>> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;

        let state = StateRepo::load(&tx, session_id)?
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;
        let now = self.clock.now();

        let Some(planned) = plan(&tx, &state, now)? else {
            return Ok(None);
        };
        let Planned {
            mut delta,
            update,
            output,
        } = planned;

        delta.step = DeltaRepo::insert_next(&tx, &delta)?;
        let checksum = delta_checksum(&delta)?;
        DeltaRepo::set_checksum(&tx, session_id, delta.step, &checksum)?;
        delta.checksum = Some(checksum);

        if !update.apply(&tx, session_id, delta.step, now)? {
            return Err(StateError::Internal(format!(
                "state row for session {session_id} vanished mid-transaction"
            )));
        }
        tx.commit()?;

        Ok(Some(Committed { delta, output }))
    }
}

fn stack_info(delta_type: DeltaType) -> DeltaInfo {
    DeltaInfo::system(delta_type, paths::VIEW_STACK, Action::new(ActionType::Navigate))
}
