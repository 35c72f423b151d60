//! Raw row shapes for `session_state` and `session_deltas`.
//!
//! Rows hold JSON columns as strings. Decoding into domain types happens
//! here and fails loudly: a column that does not parse is an
//! [`StateError::InvalidPayload`] naming the column, never an empty zone.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use vitrine_core::{
    Delta, EntityRef, Formation, SessionState, StateCurrent, StateData, StateMeta, ViewSnapshot,
    ViewState,
};

use crate::errors::{Result, StateError};

/// Raw `session_state` row.
#[derive(Clone, Debug)]
pub struct StateRow {
    /// State ID.
    pub id: String,
    /// Session ID.
    pub session_id: String,
    /// `StateData` JSON.
    pub current_data: String,
    /// `StateMeta` JSON.
    pub current_meta: String,
    /// `Formation` JSON.
    pub current_template: Option<String>,
    /// View mode wire string.
    pub view_mode: String,
    /// `EntityRef` JSON.
    pub view_focused: Option<String>,
    /// `Vec<ViewSnapshot>` JSON.
    pub view_stack: String,
    /// Latest step.
    pub step: i64,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 update time.
    pub updated_at: String,
}

impl StateRow {
    /// Decode into a [`SessionState`].
    pub fn into_state(self) -> Result<SessionState> {
        let data: StateData = decode("current_data", &self.current_data)?;
        let meta: StateMeta = decode("current_meta", &self.current_meta)?;
        let template: Option<Formation> = decode_opt("current_template", self.current_template.as_deref())?;
        let focused: Option<EntityRef> = decode_opt("view_focused", self.view_focused.as_deref())?;
        let view_stack: Vec<ViewSnapshot> = decode("view_stack", &self.view_stack)?;
        let mode = self
            .view_mode
            .parse()
            .map_err(|e| StateError::InvalidPayload(format!("view_mode: {e}")))?;

        Ok(SessionState {
            id: self.id,
            session_id: self.session_id,
            current: StateCurrent {
                data,
                meta,
                template,
            },
            view: ViewState { mode, focused },
            view_stack,
            step: self.step,
            created_at: parse_time("created_at", &self.created_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
        })
    }
}

/// Raw `session_deltas` row.
#[derive(Clone, Debug)]
pub struct DeltaRow {
    /// Session ID.
    pub session_id: String,
    /// Step.
    pub step: i64,
    /// Trigger wire string.
    pub trigger: String,
    /// Source wire string.
    pub source: String,
    /// Actor ID.
    pub actor_id: String,
    /// Delta type wire string.
    pub delta_type: String,
    /// Changed path.
    pub path: String,
    /// `Action` JSON.
    pub action: String,
    /// `ResultMeta` JSON.
    pub result: String,
    /// `Formation` JSON.
    pub template: Option<String>,
    /// `DataSnapshot` JSON.
    pub data_snapshot: Option<String>,
    /// `ViewChange` JSON.
    pub view_snapshot: Option<String>,
    /// Turn ID.
    pub turn_id: Option<String>,
    /// SHA-256 hex.
    pub checksum: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl DeltaRow {
    /// Decode into a [`Delta`].
    pub fn into_delta(self) -> Result<Delta> {
        Ok(Delta {
            trigger: parse_enum("trigger_type", &self.trigger)?,
            source: parse_enum("source", &self.source)?,
            delta_type: parse_enum("delta_type", &self.delta_type)?,
            action: decode("action", &self.action)?,
            result: decode("result", &self.result)?,
            template: decode_opt("template", self.template.as_deref())?,
            data: decode_opt("data_snapshot", self.data_snapshot.as_deref())?,
            view: decode_opt("view_snapshot", self.view_snapshot.as_deref())?,
            created_at: parse_time("created_at", &self.created_at)?,
            session_id: self.session_id,
            step: self.step,
            actor_id: self.actor_id,
            path: self.path,
            turn_id: self.turn_id,
            checksum: self.checksum,
        })
    }
}

/// Format a timestamp the way every column stores it.
pub fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StateError::InvalidPayload(format!("{column}: {e}")))
}

fn parse_enum<T>(column: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StateError::InvalidPayload(format!("{column}: {e}")))
}

fn decode<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| StateError::InvalidPayload(format!("{column}: {e}")))
}

fn decode_opt<T: DeserializeOwned>(column: &str, raw: Option<&str>) -> Result<Option<T>> {
    raw.map(|r| decode(column, r)).transpose()
}
