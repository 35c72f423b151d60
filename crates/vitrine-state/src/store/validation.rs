//! Write-boundary checks for zone payloads.
//!
//! Every check returns [`StateError::InvalidPayload`] with a message naming
//! the offending field. Nothing is persisted when a check fails.

use std::collections::HashSet;

use vitrine_core::{Formation, ResultMeta, StateData, ViewMode, ViewState};

use crate::errors::{Result, StateError};

/// Check a Data-zone payload against its result summary.
///
/// Entity IDs must be non-empty and unique per entity type, and ratings
/// finite (JSON has no NaN or infinity). A non-zero `count` must equal the
/// number of entities; a zero `count` requires an empty payload.
pub fn validate_data(data: &StateData, result: &ResultMeta) -> Result<()> {
    unique_ids("products", data.products.iter().map(|p| p.id.as_str()))?;
    unique_ids("services", data.services.iter().map(|s| s.id.as_str()))?;
    finite_ratings("products", data.products.iter().map(|p| (p.id.as_str(), p.rating)))?;
    finite_ratings("services", data.services.iter().map(|s| (s.id.as_str(), s.rating)))?;

    let len = data.len();
    if result.count == 0 && len > 0 {
        return Err(invalid(format!(
            "result count is 0 but payload holds {len} entities"
        )));
    }
    if result.count > 0 && result.count != len {
        return Err(invalid(format!(
            "result count {} does not match {len} entities in payload",
            result.count
        )));
    }
    Ok(())
}

/// Check a formation: unique non-empty widget IDs, positive grid dimensions.
pub fn validate_template(template: &Formation) -> Result<()> {
    unique_ids("widgets", template.widgets.iter().map(|w| w.id.as_str()))?;
    if let Some(grid) = template.grid {
        if grid.rows == 0 || grid.cols == 0 {
            return Err(invalid(format!(
                "grid must have at least one row and column, got {}x{}",
                grid.rows, grid.cols
            )));
        }
    }
    Ok(())
}

/// Check a view: detail mode needs a focused entity.
pub fn validate_view(view: &ViewState) -> Result<()> {
    if view.mode == ViewMode::Detail && view.focused.is_none() {
        return Err(invalid("detail view requires a focused entity".into()));
    }
    Ok(())
}

fn unique_ids<'a>(field: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(invalid(format!("{field}: empty id")));
        }
        if !seen.insert(id) {
            return Err(invalid(format!("{field}: duplicate id {id}")));
        }
    }
    Ok(())
}

fn finite_ratings<'a>(field: &str, mut ratings: impl Iterator<Item = (&'a str, Option<f64>)>) -> Result<()> {
    match ratings.find(|(_, r)| r.is_some_and(|r| !r.is_finite())) {
        Some((id, _)) => Err(invalid(format!("{field}: non-finite rating for {id}"))),
        None => Ok(()),
    }
}

fn invalid(message: String) -> StateError {
    StateError::InvalidPayload(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use vitrine_core::{EntityRef, FormationMode, GridConfig, Product, Service, Widget, WidgetSize};

    fn data(products: &[&str], services: &[&str]) -> StateData {
        StateData {
            products: products.iter().map(|id| Product::new(*id, "p")).collect(),
            services: services.iter().map(|id| Service::new(*id, "s")).collect(),
        }
    }

    fn widget(id: &str) -> Widget {
        Widget {
            id: id.into(),
            template: None,
            size: WidgetSize::Medium,
            priority: 0,
            atoms: vec![],
            entity_ref: None,
            meta: Default::default(),
        }
    }

    #[test]
    fn data_count_must_match() {
        assert!(validate_data(&data(&["p1", "p2"], &["s1"]), &ResultMeta::count(3)).is_ok());
        assert_matches!(
            validate_data(&data(&["p1"], &[]), &ResultMeta::count(2)),
            Err(StateError::InvalidPayload(msg)) if msg.contains("does not match")
        );
    }

    #[test]
    fn empty_result_requires_empty_payload() {
        assert!(validate_data(&StateData::default(), &ResultMeta::empty()).is_ok());
        assert_matches!(
            validate_data(&data(&["p1"], &[]), &ResultMeta::empty()),
            Err(StateError::InvalidPayload(msg)) if msg.contains("count is 0")
        );
    }

    #[test]
    fn duplicate_ids_rejected_per_type() {
        assert!(validate_data(&data(&["p1", "p1"], &[]), &ResultMeta::count(2)).is_err());
        // Same ID across types is fine.
        assert!(validate_data(&data(&["x1"], &["x1"]), &ResultMeta::count(2)).is_ok());
    }

    #[test]
    fn empty_id_rejected() {
        assert_matches!(
            validate_data(&data(&[""], &[]), &ResultMeta::count(1)),
            Err(StateError::InvalidPayload(msg)) if msg == "products: empty id"
        );
    }

    #[test]
    fn non_finite_ratings_rejected() {
        let mut bad = data(&["p1"], &["s1"]);
        bad.products[0].rating = Some(f64::NAN);
        assert_matches!(
            validate_data(&bad, &ResultMeta::count(2)),
            Err(StateError::InvalidPayload(msg)) if msg == "products: non-finite rating for p1"
        );

        bad.products[0].rating = Some(4.5);
        bad.services[0].rating = Some(f64::INFINITY);
        assert_matches!(
            validate_data(&bad, &ResultMeta::count(2)),
            Err(StateError::InvalidPayload(msg)) if msg == "services: non-finite rating for s1"
        );

        bad.services[0].rating = None;
        assert!(validate_data(&bad, &ResultMeta::count(2)).is_ok());
    }

    #[test]
    fn template_checks() {
        let mut f = Formation::new(FormationMode::Grid);
        f.widgets = vec![widget("w1"), widget("w2")];
        f.grid = Some(GridConfig { rows: 1, cols: 2 });
        assert!(validate_template(&f).is_ok());

        f.grid = Some(GridConfig { rows: 0, cols: 2 });
        assert!(validate_template(&f).is_err());

        f.grid = None;
        f.widgets.push(widget("w1"));
        assert_matches!(
            validate_template(&f),
            Err(StateError::InvalidPayload(msg)) if msg == "widgets: duplicate id w1"
        );
    }

    #[test]
    fn detail_view_requires_focus() {
        let bare = ViewState {
            mode: ViewMode::Detail,
            focused: None,
        };
        assert!(validate_view(&bare).is_err());
        assert!(validate_view(&ViewState::detail(EntityRef::product("p1"))).is_ok());
        assert!(validate_view(&ViewState::default()).is_ok());
    }
}
