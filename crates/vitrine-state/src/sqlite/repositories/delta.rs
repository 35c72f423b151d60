//! Delta log and step allocator.
//!
//! Deltas are immutable and append-only. [`DeltaRepo::insert_next`] assigns
//! the step inside the insert itself (`COALESCE(MAX(step), 0) + 1`), so the
//! allocation and the append are one statement; run it under an `IMMEDIATE`
//! transaction and the `UNIQUE(session_id, step)` constraint turns any
//! remaining race into an error instead of a duplicate.

use rusqlite::{Connection, params};
use vitrine_core::Delta;

use crate::errors::Result;
use crate::sqlite::row_types::{DeltaRow, format_time};

const SELECT_COLUMNS: &str = "SELECT session_id, step, trigger_type, source, actor_id, delta_type, path,
        action, result, template, data_snapshot, view_snapshot, turn_id, checksum, created_at
 FROM session_deltas";

/// Inclusive step bounds for delta queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepRange {
    /// Lowest step returned (`step >= from`).
    pub from: Option<i64>,
    /// Highest step returned (`step <= to`).
    pub to: Option<i64>,
}

impl StepRange {
    /// Every step.
    pub fn all() -> Self {
        Self::default()
    }

    /// `step >= from`.
    pub fn since(from: i64) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    /// `step <= to`.
    pub fn until(to: i64) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }
}

/// Delta log repository.
pub struct DeltaRepo;

impl DeltaRepo {
    /// Append a delta at the next step for its session and return that step.
    ///
    /// `delta.step` and `delta.checksum` are ignored; the checksum is written
    /// afterwards with [`DeltaRepo::set_checksum`] once the step is known.
    pub fn insert_next(conn: &Connection, delta: &Delta) -> Result<i64> {
        let step = conn.query_row(
            "INSERT INTO session_deltas (session_id, step, trigger_type, source, actor_id, delta_type, path,
                                         action, result, template, data_snapshot, view_snapshot,
                                         turn_id, created_at)
             SELECT ?1, COALESCE(MAX(step), 0) + 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13
             FROM session_deltas WHERE session_id = ?1
             RETURNING step",
            params![
                delta.session_id,
                delta.trigger.as_str(),
                delta.source.as_str(),
                delta.actor_id,
                delta.delta_type.as_str(),
                delta.path,
                serde_json::to_string(&delta.action)?,
                serde_json::to_string(&delta.result)?,
                delta.template.as_ref().map(serde_json::to_string).transpose()?,
                delta.data.as_ref().map(serde_json::to_string).transpose()?,
                delta.view.as_ref().map(serde_json::to_string).transpose()?,
                delta.turn_id,
                format_time(delta.created_at),
            ],
            |row| row.get(0),
        )?;
        Ok(step)
    }

    /// Record the checksum of an appended delta.
    pub fn set_checksum(conn: &Connection, session_id: &str, step: i64, checksum: &str) -> Result<()> {
        let _ = conn.execute(
            "UPDATE session_deltas SET checksum = ?3 WHERE session_id = ?1 AND step = ?2",
            params![session_id, step, checksum],
        )?;
        Ok(())
    }

    /// Highest step for a session, or 0 when it has no deltas.
    pub fn max_step(conn: &Connection, session_id: &str) -> Result<i64> {
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(step), 0) FROM session_deltas WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Number of deltas for a session.
    pub fn count(conn: &Connection, session_id: &str) -> Result<i64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM session_deltas WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Raw rows for a session within `range`, ascending by step.
    pub fn list(conn: &Connection, session_id: &str, range: StepRange) -> Result<Vec<DeltaRow>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE session_id = ?1
               AND (?2 IS NULL OR step >= ?2)
               AND (?3 IS NULL OR step <= ?3)
             ORDER BY step ASC"
        ))?;
        let rows = stmt
            .query_map(params![session_id, range.from, range.to], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Decoded deltas for a session within `range`, ascending by step.
    pub fn load(conn: &Connection, session_id: &str, range: StepRange) -> Result<Vec<Delta>> {
        Self::list(conn, session_id, range)?
            .into_iter()
            .map(DeltaRow::into_delta)
            .collect()
    }

    /// Deltas recorded under one conversational turn, ascending by step.
    pub fn load_turn(conn: &Connection, session_id: &str, turn_id: &str) -> Result<Vec<Delta>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE session_id = ?1 AND turn_id = ?2 ORDER BY step ASC"
        ))?;
        let deltas = stmt
            .query_map(params![session_id, turn_id], Self::map_row)?
            .map(|row| row?.into_delta())
            .collect::<Result<Vec<_>>>()?;
        Ok(deltas)
    }

    /// Delete every delta for a session.
    pub fn delete_for_session(conn: &Connection, session_id: &str) -> Result<usize> {
        let n = conn.execute(
            "DELETE FROM session_deltas WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(n)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeltaRow> {
        Ok(DeltaRow {
            session_id: row.get(0)?,
            step: row.get(1)?,
            trigger: row.get(2)?,
            source: row.get(3)?,
            actor_id: row.get(4)?,
            delta_type: row.get(5)?,
            path: row.get(6)?,
            action: row.get(7)?,
            result: row.get(8)?,
            template: row.get(9)?,
            data_snapshot: row.get(10)?,
            view_snapshot: row.get(11)?,
            turn_id: row.get(12)?,
            checksum: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}
