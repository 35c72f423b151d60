//! Deltas: immutable records of one state mutation.
//!
//! Callers describe *why* a write happens with a [`DeltaInfo`]. The write
//! coordinator turns it into a persisted [`Delta`] by assigning the step,
//! the timestamp and the zone value that was written, so a delta log can be
//! replayed into the exact state it produced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::formation::Formation;
use crate::zones::{StateData, StateMeta, ViewSnapshot, ViewState};

/// Well-known delta paths.
pub mod paths {
    /// Product results in the Data zone.
    pub const DATA_PRODUCTS: &str = "data.products";
    /// Service results in the Data zone.
    pub const DATA_SERVICES: &str = "data.services";
    /// Alias bindings in the Data-zone meta.
    pub const META_ALIASES: &str = "meta.aliases";
    /// Template zone.
    pub const TEMPLATE: &str = "template";
    /// View zone.
    pub const VIEW: &str = "view";
    /// Navigation stack.
    pub const VIEW_STACK: &str = "viewStack";
    /// Whole state (rollback).
    pub const STATE: &str = "state";
}

wire_enum! {
    /// What initiated the mutation.
    TriggerType ("trigger type") {
        /// A user chat message.
        UserQuery => "USER_QUERY",
        /// A click or other widget interaction.
        WidgetAction => "WIDGET_ACTION",
        /// Engine-initiated (rollback, navigation bookkeeping).
        System => "SYSTEM",
    }
}

wire_enum! {
    /// Who performed the mutation.
    DeltaSource ("delta source") {
        /// An agent.
        Llm => "llm",
        /// The user directly.
        User => "user",
        /// The engine.
        System => "system",
    }
}

wire_enum! {
    /// Kind of change.
    DeltaType ("delta type") {
        /// New content.
        Add => "add",
        /// Replaced content.
        Update => "update",
        /// Removed content.
        Remove => "remove",
        /// View pushed onto the stack.
        Push => "push",
        /// View popped off the stack.
        Pop => "pop",
        /// State restored to an earlier step.
        Rollback => "rollback",
    }
}

wire_enum! {
    /// Operation that produced the change.
    ActionType ("action type") {
        /// Catalog search.
        Search => "SEARCH",
        /// Narrowing of the current result.
        Filter => "FILTER",
        /// Reordering of the current result.
        Sort => "SORT",
        /// Formation / layout change.
        Layout => "LAYOUT",
        /// View navigation.
        Navigate => "NAVIGATE",
        /// Rollback to an earlier step.
        Rollback => "ROLLBACK",
    }
}

/// Operation details recorded on a delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Operation kind.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Tool that performed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool parameters.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Action {
    /// Action with no tool and no parameters.
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            tool: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the tool name.
    #[must_use]
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Add one parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.params.insert(key.into(), value.into());
        self
    }
}

/// Result summary recorded on a delta.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    /// Number of entities the operation produced. Zero marks an empty result.
    pub count: usize,
    /// Field names present in the result.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Alias bindings the operation established.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl ResultMeta {
    /// Summary with only a count.
    pub fn count(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// Empty result.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Data zone value written by a delta.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    /// Entities written.
    pub data: StateData,
    /// Meta written alongside.
    pub meta: StateMeta,
}

/// View zone value written by a delta.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChange {
    /// View written.
    pub view: ViewState,
    /// Stack after the write.
    pub stack: Vec<ViewSnapshot>,
}

/// Persisted, immutable change record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    /// Owning session.
    pub session_id: String,
    /// Step assigned by the allocator.
    pub step: i64,
    /// What initiated the change.
    pub trigger: TriggerType,
    /// Who performed it.
    pub source: DeltaSource,
    /// Performing agent or user.
    pub actor_id: String,
    /// Kind of change.
    pub delta_type: DeltaType,
    /// Path of the changed value.
    pub path: String,
    /// Operation details.
    pub action: Action,
    /// Result summary.
    pub result: ResultMeta,
    /// Template written (Template-zone writes and rollbacks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Formation>,
    /// Data written (non-empty Data-zone writes and rollbacks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSnapshot>,
    /// View and stack written (View-zone writes and rollbacks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewChange>,
    /// Conversational turn the delta belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    /// SHA-256 of the delta content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// When the delta was recorded.
    pub created_at: DateTime<Utc>,
}

impl Delta {
    /// Whether this delta records an empty result (no entities).
    pub fn is_empty_result(&self) -> bool {
        self.result.count == 0
    }

    /// Whether replaying this delta changes any zone.
    pub fn changes_zones(&self) -> bool {
        self.data.is_some() || self.template.is_some() || self.view.is_some()
    }
}

/// Caller-supplied description of a mutation.
///
/// Everything a delta needs except what the engine assigns: step, timestamp,
/// the written zone value and the checksum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaInfo {
    /// What initiated the change.
    pub trigger: TriggerType,
    /// Who performed it.
    pub source: DeltaSource,
    /// Performing agent or user.
    pub actor_id: String,
    /// Kind of change.
    pub delta_type: DeltaType,
    /// Path of the changed value.
    pub path: String,
    /// Operation details.
    pub action: Action,
    /// Result summary.
    #[serde(default)]
    pub result: ResultMeta,
    /// Conversational turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

impl DeltaInfo {
    /// Describe a change.
    pub fn new(
        trigger: TriggerType,
        source: DeltaSource,
        actor_id: impl Into<String>,
        delta_type: DeltaType,
        path: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            trigger,
            source,
            actor_id: actor_id.into(),
            delta_type,
            path: path.into(),
            action,
            result: ResultMeta::default(),
            turn_id: None,
        }
    }

    /// Agent-driven catalog search in response to a user query.
    pub fn search(actor_id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::new(
            TriggerType::UserQuery,
            DeltaSource::Llm,
            actor_id,
            DeltaType::Update,
            paths::DATA_PRODUCTS,
            Action::new(ActionType::Search).tool(tool),
        )
    }

    /// Agent-driven layout change.
    pub fn layout(actor_id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::new(
            TriggerType::UserQuery,
            DeltaSource::Llm,
            actor_id,
            DeltaType::Update,
            paths::TEMPLATE,
            Action::new(ActionType::Layout).tool(tool),
        )
    }

    /// User-driven navigation from a widget interaction.
    pub fn navigate(actor_id: impl Into<String>) -> Self {
        Self::new(
            TriggerType::WidgetAction,
            DeltaSource::User,
            actor_id,
            DeltaType::Update,
            paths::VIEW,
            Action::new(ActionType::Navigate),
        )
    }

    /// Engine bookkeeping delta.
    pub fn system(delta_type: DeltaType, path: impl Into<String>, action: Action) -> Self {
        Self::new(
            TriggerType::System,
            DeltaSource::System,
            "system",
            delta_type,
            path,
            action,
        )
    }

    /// Set the result summary.
    #[must_use]
    pub fn with_result(mut self, result: ResultMeta) -> Self {
        self.result = result;
        self
    }

    /// Set the turn ID.
    #[must_use]
    pub fn with_turn(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    /// Set the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Materialize into a delta with no zone snapshots attached.
    pub fn to_delta(self, session_id: impl Into<String>, step: i64, created_at: DateTime<Utc>) -> Delta {
        Delta {
            session_id: session_id.into(),
            step,
            trigger: self.trigger,
            source: self.source,
            actor_id: self.actor_id,
            delta_type: self.delta_type,
            path: self.path,
            action: self.action,
            result: self.result,
            template: None,
            data: None,
            view: None,
            turn_id: self.turn_id,
            checksum: None,
            created_at,
        }
    }
}
