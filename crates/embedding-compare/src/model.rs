//! Wire and domain types for the comparison view.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Pair of embedding dimensions plotted on the x and y axes
pub type Dimensions = [u32; 2];

/// Opaque identifier of a track or segment, e.g. `segment/3/1042`
pub type EntityId = String;

/// category -> label -> ids, as sent back with every plot response
pub type HighlightCatalog = BTreeMap<String, BTreeMap<String, Vec<EntityId>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Id of the panel rendering this side
    pub fn plot_id(self) -> &'static str {
        match self {
            Side::Left => "plot-left",
            Side::Right => "plot-right",
        }
    }

    pub fn form_id(self) -> &'static str {
        match self {
            Side::Left => "form-left",
            Side::Right => "form-right",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotConfiguration {
    #[serde(skip)]
    pub side: Option<Side>,
    pub architecture: String,
    pub dataset: String,
    pub layer: String,
    pub projection: String,
    pub dimensions: Option<Dimensions>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFilters {
    pub tags: BTreeSet<String>,
    pub artists: BTreeSet<String>,
    pub sparse: Option<String>,
    pub webgl: bool,
}

/// Body of `POST /plot-advanced`. Built once per submit and only read afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub models: BTreeMap<Side, PlotConfiguration>,
    pub data: SharedFilters,
    pub highlight: Vec<EntityId>,
}

impl RequestPayload {
    pub fn sides(&self) -> Vec<Side> {
        self.models.keys().copied().collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotResponse {
    pub plots: BTreeMap<Side, Figure>,
    #[serde(default, deserialize_with = "catalog_ids_as_strings")]
    pub highlight: HighlightCatalog,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    #[serde(default)]
    pub data: Vec<Trace>,
    #[serde(default)]
    pub layout: Layout,
}

impl Figure {
    /// Number of points per series, the shape used to decide if two panels are comparable
    pub fn shape(&self) -> Vec<usize> {
        self.data.iter().map(Trace::len).collect()
    }

    pub fn point_count(&self) -> usize {
        self.data.iter().map(Trace::len).sum()
    }

    pub fn entity(&self, point: PointRef) -> Option<&EntityId> {
        self.data.get(point.curve)?.ids.get(point.point)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub x: Vec<f64>,
    #[serde(default)]
    pub y: Vec<f64>,
    #[serde(default, deserialize_with = "ids_as_strings")]
    pub ids: Vec<EntityId>,
    #[serde(default)]
    pub hovertext: Vec<String>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn draws_lines(&self) -> bool {
        self.mode.as_deref().is_some_and(|m| m.contains("lines"))
    }
}

// Track ids come back as integers, segment ids as strings.
fn ids_as_strings<'de, D>(deserializer: D) -> Result<Vec<EntityId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().map(id_string).collect())
}

fn catalog_ids_as_strings<'de, D>(deserializer: D) -> Result<HighlightCatalog, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(category, labels)| {
            let labels = labels.into_iter().map(|(label, ids)| (label, ids.into_iter().map(id_string).collect())).collect();
            (category, labels)
        })
        .collect())
}

fn id_string(value: serde_json::Value) -> EntityId {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub title: Option<Title>,
    #[serde(default)]
    pub xaxis: Option<Axis>,
    #[serde(default)]
    pub yaxis: Option<Axis>,
    #[serde(default)]
    pub dragmode: Option<String>,
}

impl Layout {
    pub fn x_title(&self) -> Option<&str> {
        self.xaxis.as_ref()?.title.as_ref().map(Title::text)
    }

    pub fn y_title(&self) -> Option<&str> {
        self.yaxis.as_ref()?.title.as_ref().map(Title::text)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    #[serde(default)]
    pub title: Option<Title>,
}

/// Titles arrive either as a bare string or as `{"text": ...}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Title {
    Text(String),
    Object { text: String },
}

impl Title {
    pub fn text(&self) -> &str {
        match self {
            Title::Text(t) | Title::Object { text: t } => t,
        }
    }
}

/// (series index, point index) inside one figure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointRef {
    pub curve: usize,
    pub point: usize,
}

impl PointRef {
    pub fn new(curve: usize, point: usize) -> Self {
        Self { curve, point }
    }
}

/// Response of `GET /audio/{id}`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: String,
}

/// Response of `GET /metadata`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub architectures: BTreeMap<String, ArchitectureInfo>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetInfo>,
    #[serde(default, rename = "offline-projections")]
    pub offline_projections: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub layers: BTreeMap<String, LayerInfo>,
    #[serde(default, rename = "segment-length")]
    pub segment_length: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    #[serde(default)]
    pub size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_side_names() {
        let mut payload = RequestPayload::default();
        payload.models.insert(
            Side::Left,
            PlotConfiguration {
                side: Some(Side::Left),
                architecture: "musicnn".into(),
                dataset: "mtt".into(),
                layer: "taggrams".into(),
                projection: "original".into(),
                dimensions: Some([3, 7]),
            },
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["models"]["left"]["architecture"], "musicnn");
        assert_eq!(json["models"]["left"]["dimensions"], serde_json::json!([3, 7]));
        assert!(json["models"]["left"].get("side").is_none());
        assert_eq!(json["data"]["webgl"], false);
    }

    #[test]
    fn figure_accepts_plotly_json() {
        let raw = r#"{
            "data": [
                {"x": [0.1, 0.2], "y": [1.0, 2.0], "ids": [10, 11], "mode": "lines+markers", "name": "a.mp3"},
                {"x": [0.3], "y": [0.5], "ids": ["segment/3/7"], "hovertext": ["seg"]}
            ],
            "layout": {"xaxis": {"title": {"text": "guitar"}}, "yaxis": {"title": "piano"}, "margin": {"l": 40}}
        }"#;
        let fig: Figure = serde_json::from_str(raw).unwrap();
        assert_eq!(fig.shape(), vec![2, 1]);
        assert_eq!(fig.point_count(), 3);
        assert_eq!(fig.entity(PointRef::new(0, 1)).map(String::as_str), Some("11"));
        assert_eq!(fig.entity(PointRef::new(1, 0)).map(String::as_str), Some("segment/3/7"));
        assert!(fig.entity(PointRef::new(2, 0)).is_none());
        assert!(fig.data[0].draws_lines());
        assert_eq!(fig.layout.x_title(), Some("guitar"));
        assert_eq!(fig.layout.y_title(), Some("piano"));
    }

    #[test]
    fn highlight_catalog_accepts_numeric_ids() {
        let raw = r#"{
            "plots": {"left": {"data": [{"x": [0.0], "y": [1.0], "ids": [10]}]}},
            "highlight": {"artist": {"Band": [10, 11]}, "tag": {"rock": ["segment/3/7"]}}
        }"#;
        let response: PlotResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.highlight["artist"]["Band"], vec!["10", "11"]);
        assert_eq!(response.highlight["tag"]["rock"], vec!["segment/3/7"]);
        assert_eq!(response.plots[&Side::Left].shape(), vec![1]);

        let bare: PlotResponse = serde_json::from_str(r#"{"plots": {}}"#).unwrap();
        assert!(bare.highlight.is_empty());
    }

    #[test]
    fn metadata_reads_hyphenated_keys() {
        let raw = r#"{
            "architectures": {"musicnn": {"datasets": ["mtt"], "layers": {"taggrams": {"size": 50}}, "segment-length": 3}},
            "datasets": {"mtt": {"name": "MTT", "description": "", "tags": ["rock"]}},
            "offline-projections": ["pca", "tsne"]
        }"#;
        let meta: Metadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.architectures["musicnn"].layers["taggrams"].size, 50);
        assert_eq!(meta.architectures["musicnn"].segment_length, Some(3.0));
        assert_eq!(meta.offline_projections, vec!["pca", "tsne"]);
    }
}
