//! Builds the plot request from form state.
//!
//! Forms are plain structs owned by the app. A submit snapshots them into an
//! immutable [`RequestPayload`]; nothing reads the controls after that.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::audio_link::TriggerMode;
use crate::model::{Dimensions, EntityId, HighlightCatalog, PlotConfiguration, RequestPayload, SharedFilters, Side};

/// Model selection for one side (`form-left` / `form-right`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideForm {
    pub architecture: String,
    pub dataset: String,
    pub layer: String,
    pub projection: String,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

impl Default for SideForm {
    fn default() -> Self {
        Self {
            architecture: "musicnn".to_string(),
            dataset: "mtt".to_string(),
            layer: "taggrams".to_string(),
            projection: "original".to_string(),
            dimensions: Some([0, 1]),
        }
    }
}

impl SideForm {
    pub fn to_configuration(&self, side: Side) -> PlotConfiguration {
        PlotConfiguration {
            side: Some(side),
            architecture: self.architecture.clone(),
            dataset: self.dataset.clone(),
            layer: self.layer.clone(),
            projection: self.projection.clone(),
            dimensions: self.dimensions,
        }
    }
}

impl From<&PlotConfiguration> for SideForm {
    fn from(config: &PlotConfiguration) -> Self {
        Self {
            architecture: config.architecture.clone(),
            dataset: config.dataset.clone(),
            layer: config.layer.clone(),
            projection: config.projection.clone(),
            dimensions: config.dimensions,
        }
    }
}

/// Shared data filters (`form-data`)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataForm {
    pub tags: Vec<String>,
    /// Free text, comma separated
    pub artists: String,
    pub sparse: Option<String>,
    pub webgl: bool,
}

impl DataForm {
    pub fn to_filters(&self) -> SharedFilters {
        SharedFilters {
            tags: self.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).map(str::to_string).collect(),
            artists: self
                .artists
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
            sparse: self.sparse.clone().filter(|s| !s.is_empty()),
            webgl: self.webgl,
        }
    }
}

/// Highlight selection and audio trigger (`form-highlight`)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighlightForm {
    /// Selected category in `highlight-entity`
    pub entity: Option<String>,
    /// Options currently offered in `highlight-items`
    pub options: Vec<HighlightOption>,
    /// Selected option values, each a JSON-encoded array of ids
    pub selected: Vec<String>,
    pub trigger: TriggerMode,
}

impl HighlightForm {
    /// Clear category and items, done when the data filters change
    pub fn reset(&mut self) {
        self.entity = None;
        self.options.clear();
        self.selected.clear();
    }

    /// Repopulate `highlight-items` for the chosen category
    pub fn select_entity(&mut self, catalog: &HighlightCatalog, entity: Option<String>) {
        self.options = entity.as_deref().map(|e| highlight_options(catalog, e)).unwrap_or_default();
        self.selected.clear();
        self.entity = entity;
    }

    pub fn toggle(&mut self, value: &str) {
        if let Some(pos) = self.selected.iter().position(|v| v == value) {
            self.selected.remove(pos);
        } else {
            self.selected.push(value.to_string());
        }
    }

    pub fn is_selected(&self, value: &str) -> bool {
        self.selected.iter().any(|v| v == value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HighlightOption {
    pub label: String,
    /// JSON-encoded id array
    pub value: String,
}

/// Options for one highlight category, in label order
pub fn highlight_options(catalog: &HighlightCatalog, entity: &str) -> Vec<HighlightOption> {
    let Some(items) = catalog.get(entity) else {
        tracing::debug!(entity, "no highlight items for category");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|(label, ids)| {
            serde_json::to_string(ids)
                .ok()
                .map(|value| HighlightOption { label: label.clone(), value })
        })
        .collect()
}

/// Parse every selected option value, concatenate and dedupe keeping first occurrence.
/// Values that are not JSON arrays of ids are skipped.
pub fn collect_highlight<S: AsRef<str>>(values: &[S]) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for raw in values {
        let parsed: Vec<serde_json::Value> = match serde_json::from_str(raw.as_ref()) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(value = raw.as_ref(), error = %e, "ignoring malformed highlight value");
                continue;
            }
        };
        for value in parsed {
            let id = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Snapshot the forms into the payload for the given sides
pub fn build_payload(
    sides: &[Side],
    left: &SideForm,
    right: &SideForm,
    data: &DataForm,
    highlight: &HighlightForm,
) -> RequestPayload {
    let models: BTreeMap<Side, PlotConfiguration> = sides
        .iter()
        .map(|&side| {
            let form = match side {
                Side::Left => left,
                Side::Right => right,
            };
            (side, form.to_configuration(side))
        })
        .collect();

    RequestPayload {
        models,
        data: data.to_filters(),
        highlight: collect_highlight(&highlight.selected),
    }
}
