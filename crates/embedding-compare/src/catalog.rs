//! What the side forms may offer, derived from `GET /metadata`.

use crate::model::{Dimensions, Metadata};
use crate::request::SideForm;

pub const PRINCIPAL_COMPONENTS: u32 = 6;

/// How the two plotted dimensions are picked for a configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DimensionChoice {
    /// Taggram dimensions, one per tag
    Tags(Vec<String>),
    /// Raw embedding index in `0..size`
    Index { size: u32 },
    /// `PC1..PC6`
    Components(Vec<String>),
    /// t-SNE output is already 2-D
    Fixed(Dimensions),
    /// Nothing known about this layer
    Unavailable,
}

impl DimensionChoice {
    /// Number of selectable dimensions, `None` when the choice is fixed
    pub fn count(&self) -> Option<u32> {
        match self {
            DimensionChoice::Tags(labels) | DimensionChoice::Components(labels) => Some(labels.len() as u32),
            DimensionChoice::Index { size } => Some(*size),
            DimensionChoice::Fixed(_) | DimensionChoice::Unavailable => None,
        }
    }

    pub fn label(&self, dim: u32) -> String {
        match self {
            DimensionChoice::Tags(labels) | DimensionChoice::Components(labels) => {
                labels.get(dim as usize).cloned().unwrap_or_else(|| dim.to_string())
            }
            _ => dim.to_string(),
        }
    }

    /// Dimensions to send: fixed ones as-is, chosen ones only when in range
    pub fn resolve(&self, current: Option<Dimensions>) -> Option<Dimensions> {
        match self {
            DimensionChoice::Fixed(dims) => Some(*dims),
            DimensionChoice::Unavailable => current,
            _ => {
                let count = self.count()?;
                current.filter(|dims| dims.iter().all(|d| *d < count))
            }
        }
    }
}

pub fn architectures(metadata: &Metadata) -> Vec<String> {
    metadata.architectures.keys().cloned().collect()
}

pub fn allowed_datasets(metadata: &Metadata, architecture: &str) -> Vec<String> {
    metadata.architectures.get(architecture).map(|a| a.datasets.clone()).unwrap_or_default()
}

pub fn allowed_layers(metadata: &Metadata, architecture: &str) -> Vec<String> {
    metadata.architectures.get(architecture).map(|a| a.layers.keys().cloned().collect()).unwrap_or_default()
}

/// `original` first, then whatever the server precomputed
pub fn projections(metadata: &Metadata) -> Vec<String> {
    let mut projections = vec!["original".to_string()];
    let always = ["pca".to_string(), "tsne".to_string()];
    for projection in metadata.offline_projections.iter().chain(always.iter()) {
        if !projections.contains(projection) {
            projections.push(projection.clone());
        }
    }
    projections
}

/// Snap dataset and layer to the first allowed value after an architecture change.
/// Returns true when the form changed.
pub fn snap_form(metadata: &Metadata, form: &mut SideForm) -> bool {
    if !metadata.architectures.contains_key(&form.architecture) {
        return false;
    }
    let mut changed = false;
    let datasets = allowed_datasets(metadata, &form.architecture);
    if !datasets.contains(&form.dataset) {
        if let Some(first) = datasets.first() {
            tracing::debug!(architecture = %form.architecture, dataset = %first, "snapping dataset");
            form.dataset = first.clone();
            changed = true;
        }
    }
    let layers = allowed_layers(metadata, &form.architecture);
    if !layers.contains(&form.layer) {
        if let Some(first) = layers.first() {
            tracing::debug!(architecture = %form.architecture, layer = %first, "snapping layer");
            form.layer = first.clone();
            changed = true;
        }
    }
    changed
}

pub fn dimension_choices(metadata: &Metadata, form: &SideForm) -> DimensionChoice {
    match form.projection.as_str() {
        "tsne" => DimensionChoice::Fixed([0, 1]),
        "pca" | "std-pca" => {
            DimensionChoice::Components((1..=PRINCIPAL_COMPONENTS).map(|i| format!("PC{i}")).collect())
        }
        "original" if form.layer == "taggrams" => match metadata.datasets.get(&form.dataset) {
            Some(dataset) => DimensionChoice::Tags(dataset.tags.clone()),
            None => DimensionChoice::Unavailable,
        },
        "original" => metadata
            .architectures
            .get(&form.architecture)
            .and_then(|a| a.layers.get(&form.layer))
            .map(|layer| DimensionChoice::Index { size: layer.size })
            .unwrap_or(DimensionChoice::Unavailable),
        _ => DimensionChoice::Unavailable,
    }
}
