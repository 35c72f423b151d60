//! Formations: the rendering instruction tree stored in the Template zone.
//!
//! A formation is produced by the presentation tooling (layout mode, ordered
//! widgets, per-widget atoms) and carries a [`RenderConfig`] describing the
//! choices made so the next turn can keep the same style.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{EntityRef, EntityType};

wire_enum! {
    /// Layout mode of a formation.
    FormationMode ("formation mode") {
        /// Responsive grid.
        Grid => "grid",
        /// Vertical list.
        List => "list",
        /// Horizontal carousel.
        Carousel => "carousel",
        /// Single focused widget.
        Single => "single",
        /// Side-by-side comparison.
        Comparison => "comparison",
    }
}

wire_enum! {
    /// Widget footprint.
    WidgetSize ("widget size") {
        /// Compact tile.
        Tiny => "tiny",
        /// Small card.
        Small => "small",
        /// Medium card.
        Medium => "medium",
        /// Large card.
        Large => "large",
    }
}

wire_enum! {
    /// Base type of atomic data.
    AtomType ("atom type") {
        /// Text value.
        Text => "text",
        /// Numeric value.
        Number => "number",
        /// Image reference.
        Image => "image",
        /// Icon reference.
        Icon => "icon",
        /// Video reference.
        Video => "video",
        /// Audio reference.
        Audio => "audio",
    }
}

wire_enum! {
    /// Placement hint for an atom inside a widget template.
    AtomSlot ("atom slot") {
        /// Main image or carousel.
        Hero => "hero",
        /// Badge overlay.
        Badge => "badge",
        /// Title line.
        Title => "title",
        /// Attributes shown immediately.
        Primary => "primary",
        /// Price block.
        Price => "price",
        /// Expandable attributes.
        Secondary => "secondary",
        /// Full gallery.
        Gallery => "gallery",
        /// Availability indicator.
        Stock => "stock",
        /// Description block.
        Description => "description",
        /// Tag chips.
        Tags => "tags",
        /// Specification table.
        Specs => "specs",
    }
}

/// Grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Row count.
    pub rows: u32,
    /// Column count.
    pub cols: u32,
}

/// Smallest UI building block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Atom {
    /// Base data type.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// Data format within the type (e.g. `currency`, `rating`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Visual format (e.g. `h1`, `price-lg`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Rendered value.
    pub value: Value,
    /// Source field name on the entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    /// Template slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<AtomSlot>,
    /// Extra rendering hints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

/// A composed UI element made of atoms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    /// Widget ID, unique within the formation.
    pub id: String,
    /// Template name the widget was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Footprint.
    pub size: WidgetSize,
    /// Ordering priority (lower renders first).
    #[serde(default)]
    pub priority: i32,
    /// Atoms in display order.
    pub atoms: Vec<Atom>,
    /// Entity rendered by this widget, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_ref: Option<EntityRef>,
    /// Extra rendering hints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

/// One field the presentation agent decided to show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Entity field, e.g. `price`.
    pub name: String,
    /// Slot it was placed in, e.g. `price`.
    pub slot: String,
    /// Display format, e.g. `price-lg`.
    pub display: String,
}

/// How the last formation was rendered, for next-turn context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Entity type rendered.
    pub entity_type: EntityType,
    /// Preset name used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Layout mode.
    pub mode: FormationMode,
    /// Widget size.
    pub size: WidgetSize,
    /// Fields shown.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

/// Rendering instruction tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    /// Layout mode.
    pub mode: FormationMode,
    /// Grid dimensions (grid mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridConfig>,
    /// Widgets in order.
    pub widgets: Vec<Widget>,
    /// Render choices for the next turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RenderConfig>,
}

impl Formation {
    /// Empty formation in the given mode.
    pub fn new(mode: FormationMode) -> Self {
        Self {
            mode,
            grid: None,
            widgets: Vec::new(),
            config: None,
        }
    }

    /// Entities referenced by the widgets, in widget order.
    pub fn entity_refs(&self) -> Vec<&EntityRef> {
        self.widgets
            .iter()
            .filter_map(|w| w.entity_ref.as_ref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn price_atom() -> Atom {
        Atom {
            atom_type: AtomType::Number,
            subtype: Some("currency".into()),
            display: Some("price-lg".into()),
            value: json!(1999),
            field_name: Some("price".into()),
            slot: Some(AtomSlot::Price),
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn atom_serializes_type_key() {
        let v = serde_json::to_value(price_atom()).unwrap();
        assert_eq!(v["type"], "number");
        assert_eq!(v["fieldName"], "price");
        assert_eq!(v["slot"], "price");
        assert!(v.get("meta").is_none());
    }

    #[test]
    fn formation_parses_from_wire_json() {
        let f: Formation = serde_json::from_value(json!({
            "mode": "grid",
            "grid": {"rows": 2, "cols": 3},
            "widgets": [{
                "id": "w1",
                "size": "medium",
                "atoms": [{"type": "text", "value": "Sneaker", "slot": "title"}],
                "entityRef": {"type": "product", "id": "p1"}
            }],
            "config": {"entity_type": "product", "mode": "grid", "size": "medium"}
        }))
        .unwrap();

        assert_eq!(f.mode, FormationMode::Grid);
        assert_eq!(f.grid, Some(GridConfig { rows: 2, cols: 3 }));
        assert_eq!(f.widgets[0].priority, 0);
        assert_eq!(f.entity_refs(), vec![&EntityRef::product("p1")]);
        assert_eq!(f.config.unwrap().entity_type, EntityType::Product);
    }

    #[test]
    fn formation_rejects_unknown_mode() {
        let err = serde_json::from_value::<Formation>(json!({"mode": "mosaic", "widgets": []}));
        assert!(err.is_err());
    }

    #[test]
    fn new_formation_is_empty() {
        let f = Formation::new(FormationMode::Carousel);
        assert!(f.widgets.is_empty());
        assert!(f.entity_refs().is_empty());
    }

    #[test]
    fn atom_slot_all_round_trip_through_from_str() {
        for slot in AtomSlot::ALL {
            assert_eq!(slot.as_str().parse::<AtomSlot>().unwrap(), *slot);
        }
    }
}
