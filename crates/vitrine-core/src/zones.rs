//! The session state document and its zones.
//!
//! [`SessionState`] is split into three independently writable zones:
//!
//! - **Data**: [`StateData`] (authoritative search results) with its
//!   [`StateMeta`] (counts, field names, aliases)
//! - **Template**: an optional [`Formation`]
//! - **View**: [`ViewState`] plus the LIFO `view_stack` of [`ViewSnapshot`]s
//!
//! The shared `step` counter always equals the step of the latest delta.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delta::ResultMeta;
use crate::entities::{EntityRef, Product, Service};
use crate::formation::Formation;

/// Retrieved entities held in the Data zone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    /// Matched products.
    #[serde(default)]
    pub products: Vec<Product>,
    /// Matched services.
    #[serde(default)]
    pub services: Vec<Service>,
}

impl StateData {
    /// Total entity count.
    pub fn len(&self) -> usize {
        self.products.len() + self.services.len()
    }

    /// Whether no entities are held.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.services.is_empty()
    }

    /// References to every entity, products first.
    pub fn entity_refs(&self) -> Vec<EntityRef> {
        self.products
            .iter()
            .map(Product::entity_ref)
            .chain(self.services.iter().map(Service::entity_ref))
            .collect()
    }

    /// Whether the referenced entity is present.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        match entity.entity_type {
            crate::entities::EntityType::Product => {
                self.products.iter().any(|p| p.id == entity.id)
            }
            crate::entities::EntityType::Service => {
                self.services.iter().any(|s| s.id == entity.id)
            }
        }
    }
}

/// Payload a search or filter tool hands to `write_data`.
pub type DataPayload = StateData;

/// Metadata describing the current Data zone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMeta {
    /// Total entities in the current result.
    pub count: usize,
    /// Products in the current result.
    #[serde(default)]
    pub product_count: usize,
    /// Services in the current result.
    #[serde(default)]
    pub service_count: usize,
    /// Field names present in the current result.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Persistent bindings (e.g. `tenant_slug`) carried across data writes.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl StateMeta {
    /// Meta for a freshly written result, carrying `previous` aliases forward.
    ///
    /// Aliases named in `result` override the carried value for the same key;
    /// no previous alias is ever dropped.
    pub fn carry_forward(previous: &Self, data: &StateData, result: &ResultMeta) -> Self {
        let mut aliases = previous.aliases.clone();
        aliases.extend(result.aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            count: result.count,
            product_count: data.products.len(),
            service_count: data.services.len(),
            fields: result.fields.clone(),
            aliases,
        }
    }
}

/// Data + Template zones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateCurrent {
    /// Data zone.
    pub data: StateData,
    /// Data-zone metadata.
    pub meta: StateMeta,
    /// Template zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Formation>,
}

wire_enum! {
    /// Navigation mode of the View zone.
    #[derive(Default)]
    ViewMode ("view mode") {
        /// Result grid.
        #[default]
        Grid => "grid",
        /// Result list.
        List => "list",
        /// Single entity detail.
        Detail => "detail",
        /// Comparison of several entities.
        Comparison => "comparison",
    }
}

/// Current navigation context.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    /// Navigation mode.
    pub mode: ViewMode,
    /// Focused entity (required in detail mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<EntityRef>,
}

impl ViewState {
    /// Detail view of one entity.
    pub fn detail(entity: EntityRef) -> Self {
        Self {
            mode: ViewMode::Detail,
            focused: Some(entity),
        }
    }
}

/// Saved navigation context for back-navigation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    /// Mode at the time of the push.
    pub mode: ViewMode,
    /// Focused entity at the time of the push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<EntityRef>,
    /// Entities visible at the time of the push.
    #[serde(default)]
    pub refs: Vec<EntityRef>,
    /// Step current when the snapshot was taken.
    pub step: i64,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

/// Root state document for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// State row ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Data and Template zones.
    pub current: StateCurrent,
    /// View zone.
    pub view: ViewState,
    /// Back-navigation stack (last element is the top).
    pub view_stack: Vec<ViewSnapshot>,
    /// Latest applied step.
    pub step: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh state at step 0: empty data, no template, grid view, empty stack.
    pub fn empty(
        id: impl Into<String>,
        session_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            current: StateCurrent::default(),
            view: ViewState::default(),
            view_stack: Vec::new(),
            step: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot of the current view, suitable for pushing before navigating.
    pub fn snapshot_view(&self, now: DateTime<Utc>) -> ViewSnapshot {
        ViewSnapshot {
            mode: self.view.mode,
            focused: self.view.focused.clone(),
            refs: self.current.data.entity_refs(),
            step: self.step,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn result(count: usize, aliases: &[(&str, &str)]) -> ResultMeta {
        ResultMeta {
            count,
            fields: vec!["id".into(), "name".into()],
            aliases: aliases
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn empty_state_defaults() {
        let s = SessionState::empty("state_1", "sess-1", t0());
        assert_eq!(s.step, 0);
        assert_eq!(s.view.mode, ViewMode::Grid);
        assert!(s.view.focused.is_none());
        assert!(s.view_stack.is_empty());
        assert!(s.current.data.is_empty());
        assert!(s.current.template.is_none());
        assert!(s.current.meta.aliases.is_empty());
    }

    #[test]
    fn carry_forward_keeps_previous_aliases() {
        let mut previous = StateMeta::default();
        let _ = previous.aliases.insert("tenant_slug".into(), "acme".into());
        let data = StateData {
            products: vec![Product::new("p1", "A")],
            services: vec![Service::new("s1", "B")],
        };

        let meta = StateMeta::carry_forward(&previous, &data, &result(2, &[]));

        assert_eq!(meta.count, 2);
        assert_eq!(meta.product_count, 1);
        assert_eq!(meta.service_count, 1);
        assert_eq!(meta.aliases.get("tenant_slug").map(String::as_str), Some("acme"));
    }

    #[test]
    fn carry_forward_explicit_alias_overrides_same_key() {
        let mut previous = StateMeta::default();
        let _ = previous.aliases.insert("tenant_slug".into(), "acme".into());
        let _ = previous.aliases.insert("locale".into(), "en".into());
        let data = StateData {
            products: vec![Product::new("p1", "A")],
            services: vec![],
        };

        let meta =
            StateMeta::carry_forward(&previous, &data, &result(1, &[("tenant_slug", "globex")]));

        assert_eq!(meta.aliases["tenant_slug"], "globex");
        assert_eq!(meta.aliases["locale"], "en");
    }

    #[test]
    fn entity_refs_products_first() {
        let data = StateData {
            products: vec![Product::new("p1", "A"), Product::new("p2", "B")],
            services: vec![Service::new("s1", "C")],
        };
        assert_eq!(
            data.entity_refs(),
            vec![
                EntityRef::product("p1"),
                EntityRef::product("p2"),
                EntityRef::service("s1"),
            ]
        );
        assert!(data.contains(&EntityRef::service("s1")));
        assert!(!data.contains(&EntityRef::service("p1")));
    }

    #[test]
    fn snapshot_view_captures_refs_and_step() {
        let mut s = SessionState::empty("state_1", "sess-1", t0());
        s.current.data.products.push(Product::new("p1", "A"));
        s.step = 4;
        s.view = ViewState::detail(EntityRef::product("p1"));

        let snap = s.snapshot_view(t0());
        assert_eq!(snap.mode, ViewMode::Detail);
        assert_eq!(snap.focused, Some(EntityRef::product("p1")));
        assert_eq!(snap.refs, vec![EntityRef::product("p1")]);
        assert_eq!(snap.step, 4);
    }

    #[test]
    fn view_snapshot_json_round_trip_is_exact() {
        let snap = ViewSnapshot {
            mode: ViewMode::List,
            focused: None,
            refs: vec![EntityRef::service("s9")],
            step: 7,
            created_at: t0(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: ViewSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn alias_map() -> impl Strategy<Value = BTreeMap<String, String>> {
            prop::collection::btree_map("[a-e]", "[a-z]{1,4}", 0..5)
        }

        proptest! {
            #[test]
            fn carry_forward_aliases_are_superset(
                previous in alias_map(),
                explicit in alias_map(),
            ) {
                let prev = StateMeta { aliases: previous.clone(), ..StateMeta::default() };
                let res = ResultMeta { count: 0, fields: vec![], aliases: explicit.clone() };
                let meta = StateMeta::carry_forward(&prev, &StateData::default(), &res);

                for key in previous.keys() {
                    prop_assert!(meta.aliases.contains_key(key));
                }
                for (key, value) in &explicit {
                    prop_assert_eq!(&meta.aliases[key], value);
                }
            }
        }
    }
}
