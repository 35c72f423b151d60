//! Zone store: the `session_state` row.
//!
//! Every zone has its own update statement touching only its columns plus
//! the shared `step` and `updated_at`, so a Template write can never clobber
//! a concurrent Data write and vice versa.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use vitrine_core::{Formation, SessionState, StateData, StateMeta, ViewSnapshot, ViewState};

use crate::errors::Result;
use crate::sqlite::row_types::{StateRow, format_time};

const SELECT_COLUMNS: &str = "SELECT id, session_id, current_data, current_meta, current_template,
        view_mode, view_focused, view_stack, step, created_at, updated_at
 FROM session_state";

/// Zone store repository.
pub struct StateRepo;

impl StateRepo {
    /// Insert a new state row.
    pub fn insert(conn: &Connection, state: &SessionState) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO session_state (id, session_id, current_data, current_meta, current_template,
                                        view_mode, view_focused, view_stack, step, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                state.id,
                state.session_id,
                serde_json::to_string(&state.current.data)?,
                serde_json::to_string(&state.current.meta)?,
                to_json_opt(state.current.template.as_ref())?,
                state.view.mode.as_str(),
                to_json_opt(state.view.focused.as_ref())?,
                serde_json::to_string(&state.view_stack)?,
                state.step,
                format_time(state.created_at),
                format_time(state.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch the raw row for a session.
    pub fn get_by_session(conn: &Connection, session_id: &str) -> Result<Option<StateRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE session_id = ?1"),
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Fetch and decode the state for a session.
    pub fn load(conn: &Connection, session_id: &str) -> Result<Option<SessionState>> {
        Self::get_by_session(conn, session_id)?
            .map(StateRow::into_state)
            .transpose()
    }

    /// Whether a state row exists.
    pub fn exists(conn: &Connection, session_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM session_state WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Session IDs with state, oldest first.
    pub fn list_sessions(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT session_id FROM session_state ORDER BY created_at ASC, session_id ASC")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Replace the Data zone and its meta.
    pub fn update_data(
        conn: &Connection,
        session_id: &str,
        data: &StateData,
        meta: &StateMeta,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE session_state
             SET current_data = ?2, current_meta = ?3, step = ?4, updated_at = ?5
             WHERE session_id = ?1",
            params![
                session_id,
                serde_json::to_string(data)?,
                serde_json::to_string(meta)?,
                step,
                format_time(now),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Replace only the Data-zone meta.
    pub fn update_meta(
        conn: &Connection,
        session_id: &str,
        meta: &StateMeta,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE session_state SET current_meta = ?2, step = ?3, updated_at = ?4
             WHERE session_id = ?1",
            params![session_id, serde_json::to_string(meta)?, step, format_time(now)],
        )?;
        Ok(changed > 0)
    }

    /// Replace the Template zone.
    pub fn update_template(
        conn: &Connection,
        session_id: &str,
        template: Option<&Formation>,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE session_state SET current_template = ?2, step = ?3, updated_at = ?4
             WHERE session_id = ?1",
            params![session_id, to_json_opt(template)?, step, format_time(now)],
        )?;
        Ok(changed > 0)
    }

    /// Replace the View zone and the stack.
    pub fn update_view(
        conn: &Connection,
        session_id: &str,
        view: &ViewState,
        stack: &[ViewSnapshot],
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE session_state
             SET view_mode = ?2, view_focused = ?3, view_stack = ?4, step = ?5, updated_at = ?6
             WHERE session_id = ?1",
            params![
                session_id,
                view.mode.as_str(),
                to_json_opt(view.focused.as_ref())?,
                serde_json::to_string(stack)?,
                step,
                format_time(now),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Replace only the stack.
    pub fn update_stack(
        conn: &Connection,
        session_id: &str,
        stack: &[ViewSnapshot],
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE session_state SET view_stack = ?2, step = ?3, updated_at = ?4
             WHERE session_id = ?1",
            params![session_id, serde_json::to_string(stack)?, step, format_time(now)],
        )?;
        Ok(changed > 0)
    }

    /// Advance only the step (audit-only and empty-result deltas).
    pub fn update_step(
        conn: &Connection,
        session_id: &str,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE session_state SET step = ?2, updated_at = ?3 WHERE session_id = ?1",
            params![session_id, step, format_time(now)],
        )?;
        Ok(changed > 0)
    }

    /// Delete the state row.
    pub fn delete(conn: &Connection, session_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM session_state WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateRow> {
        Ok(StateRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            current_data: row.get(2)?,
            current_meta: row.get(3)?,
            current_template: row.get(4)?,
            view_mode: row.get(5)?,
            view_focused: row.get(6)?,
            view_stack: row.get(7)?,
            step: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

fn to_json_opt<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}
