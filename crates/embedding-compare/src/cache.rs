//! Persisted selection state: dimension pairs per model path, the audio
//! trigger mode and the last submitted side forms.

use std::collections::{BTreeMap, HashMap};

use crate::audio_link::TriggerMode;
use crate::model::{Dimensions, Metadata, Side};
use crate::request::SideForm;

pub const DIMENSIONS_KEY: &str = "dimensions";
pub const AUDIO_KEY: &str = "audio";

/// String key-value storage with browser `localStorage` semantics
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str);
    fn remove_item(&mut self, key: &str);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    items: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&mut self, key: &str) {
        self.items.remove(key);
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) {
        (**self).set_item(key, value);
    }

    fn remove_item(&mut self, key: &str) {
        (**self).remove_item(key);
    }
}

/// JSON file on disk, rewritten on every change (native build)
#[cfg(not(target_arch = "wasm32"))]
pub struct FileStore {
    path: std::path::PathBuf,
    items: BTreeMap<String, String>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn open(path: impl Into<std::path::PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(crate::Error::Storage(format!("{}: {e}", path.display()))),
        };
        Ok(Self { path, items })
    }

    fn flush(&self) {
        let result = serde_json::to_string_pretty(&self.items)
            .map_err(crate::Error::from)
            .and_then(|raw| {
                std::fs::write(&self.path, raw)
                    .map_err(|e| crate::Error::Storage(format!("{}: {e}", self.path.display())))
            });
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to persist state");
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
        self.flush();
    }

    fn remove_item(&mut self, key: &str) {
        if self.items.remove(key).is_some() {
            self.flush();
        }
    }
}

/// Browser `localStorage`. Quota or privacy-mode failures are logged and dropped.
#[cfg(target_arch = "wasm32")]
#[derive(Default)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    pub fn open() -> crate::Result<Self> {
        match Self::storage() {
            Some(_) => Ok(Self),
            None => Err(crate::Error::Storage("localStorage is not available".into())),
        }
    }

    fn storage() -> Option<web_sys::Storage> {
        web_sys::window().and_then(|w| w.local_storage().ok().flatten())
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        Self::storage().and_then(|s| s.get_item(key).ok().flatten())
    }

    fn set_item(&mut self, key: &str, value: &str) {
        if let Some(s) = Self::storage() {
            if s.set_item(key, value).is_err() {
                tracing::warn!(key, "localStorage rejected write");
            }
        }
    }

    fn remove_item(&mut self, key: &str) {
        if let Some(s) = Self::storage() {
            if s.remove_item(key).is_err() {
                tracing::warn!(key, "localStorage rejected removal");
            }
        }
    }
}

/// architecture -> dataset -> layer -> projection -> dims
type DimensionTree = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, Dimensions>>>>;

/// Typed view over a [`KeyValueStore`]
pub struct SelectionCache<S: KeyValueStore> {
    store: S,
    default_dimensions: Dimensions,
}

impl<S: KeyValueStore> SelectionCache<S> {
    pub fn new(store: S, default_dimensions: Dimensions) -> Self {
        Self { store, default_dimensions }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_tree(&self) -> DimensionTree {
        let Some(raw) = self.store.get_item(DIMENSIONS_KEY) else {
            return DimensionTree::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored dimensions are malformed, starting over");
            DimensionTree::new()
        })
    }

    fn write_tree(&mut self, tree: &DimensionTree) {
        match serde_json::to_string(tree) {
            Ok(raw) => self.store.set_item(DIMENSIONS_KEY, &raw),
            Err(e) => tracing::error!(error = %e, "failed to encode dimensions"),
        }
    }

    /// Fill every architecture x dataset x layer x projection path that is
    /// still missing with `default`. Existing entries are kept.
    pub fn initialize(&mut self, metadata: &Metadata, projections: &[String], default: Dimensions) {
        let mut tree = self.read_tree();
        let mut added = 0usize;
        for (architecture, info) in &metadata.architectures {
            let datasets = tree.entry(architecture.clone()).or_default();
            for dataset in &info.datasets {
                let layers = datasets.entry(dataset.clone()).or_default();
                for layer in info.layers.keys() {
                    let slots = layers.entry(layer.clone()).or_default();
                    for projection in projections {
                        slots.entry(projection.clone()).or_insert_with(|| {
                            added += 1;
                            default
                        });
                    }
                }
            }
        }
        tracing::debug!(added, "initialized dimension cache");
        self.write_tree(&tree);
    }

    pub fn lookup(&self, architecture: &str, dataset: &str, layer: &str, projection: &str) -> Option<Dimensions> {
        self.read_tree()
            .get(architecture)?
            .get(dataset)?
            .get(layer)?
            .get(projection)
            .copied()
    }

    /// Stored pair or the default. A missing path means the catalog changed
    /// since the cache was initialized.
    pub fn get(&self, architecture: &str, dataset: &str, layer: &str, projection: &str) -> Dimensions {
        self.lookup(architecture, dataset, layer, projection).unwrap_or_else(|| {
            tracing::warn!(architecture, dataset, layer, projection, "no cached dimensions, using default");
            self.default_dimensions
        })
    }

    pub fn set(&mut self, architecture: &str, dataset: &str, layer: &str, projection: &str, dims: Dimensions) {
        let mut tree = self.read_tree();
        tree.entry(architecture.to_string())
            .or_default()
            .entry(dataset.to_string())
            .or_default()
            .entry(layer.to_string())
            .or_default()
            .insert(projection.to_string(), dims);
        self.write_tree(&tree);
    }

    /// Trigger mode, writing `default` on first use
    pub fn trigger_mode(&mut self, default: TriggerMode) -> TriggerMode {
        match self.store.get_item(AUDIO_KEY) {
            Some(raw) => TriggerMode::parse(&raw),
            None => {
                self.set_trigger_mode(default);
                default
            }
        }
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) {
        self.store.set_item(AUDIO_KEY, mode.as_str());
    }

    pub fn side_form(&self, side: Side) -> Option<SideForm> {
        let raw = self.store.get_item(&side_key(side))?;
        serde_json::from_str(&raw)
            .map_err(|e| tracing::warn!(side = side.as_str(), error = %e, "ignoring stored selection"))
            .ok()
    }

    /// Record a successful submit: the side form and its dimensions
    pub fn remember_submit(&mut self, side: Side, form: &SideForm) {
        match serde_json::to_string(form) {
            Ok(raw) => self.store.set_item(&side_key(side), &raw),
            Err(e) => tracing::error!(error = %e, "failed to encode side selection"),
        }
        if let Some(dims) = form.dimensions {
            self.set(&form.architecture, &form.dataset, &form.layer, &form.projection, dims);
        }
    }
}

fn side_key(side: Side) -> String {
    format!("selection-{}", side.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArchitectureInfo, LayerInfo};

    fn metadata() -> Metadata {
        let mut meta = Metadata::default();
        for (name, datasets) in [("musicnn", vec!["mtt", "msd"]), ("vggish", vec!["audioset"])] {
            let mut info = ArchitectureInfo { datasets: datasets.into_iter().map(String::from).collect(), ..Default::default() };
            info.layers.insert("embeddings".into(), LayerInfo { size: 200 });
            info.layers.insert("taggrams".into(), LayerInfo { size: 50 });
            meta.architectures.insert(name.into(), info);
        }
        meta
    }

    fn projections() -> Vec<String> {
        vec!["original".into(), "pca".into()]
    }

    #[test]
    fn initialize_covers_every_valid_tuple() {
        let meta = metadata();
        let mut cache = SelectionCache::new(MemoryStore::new(), [0, 1]);
        cache.initialize(&meta, &projections(), [0, 1]);

        for (arch, info) in &meta.architectures {
            for dataset in &info.datasets {
                for layer in info.layers.keys() {
                    for projection in projections() {
                        assert_eq!(cache.lookup(arch, dataset, layer, &projection), Some([0, 1]));
                    }
                }
            }
        }
        // dataset not offered by the architecture is not populated
        assert_eq!(cache.lookup("vggish", "mtt", "taggrams", "pca"), None);
    }

    #[test]
    fn initialize_keeps_existing_values() {
        let mut cache = SelectionCache::new(MemoryStore::new(), [0, 1]);
        cache.set("musicnn", "mtt", "taggrams", "original", [4, 9]);
        cache.initialize(&metadata(), &projections(), [0, 1]);
        assert_eq!(cache.get("musicnn", "mtt", "taggrams", "original"), [4, 9]);
        assert_eq!(cache.get("musicnn", "mtt", "taggrams", "pca"), [0, 1]);
    }

    #[test]
    fn set_then_get_round_trips_without_collisions() {
        let mut cache = SelectionCache::new(MemoryStore::new(), [0, 1]);
        cache.initialize(&metadata(), &projections(), [0, 1]);
        cache.set("musicnn", "mtt", "embeddings", "original", [12, 40]);
        cache.set("musicnn", "msd", "embeddings", "original", [3, 5]);
        cache.set("musicnn", "mtt", "embeddings", "pca", [1, 2]);

        assert_eq!(cache.get("musicnn", "mtt", "embeddings", "original"), [12, 40]);
        assert_eq!(cache.get("musicnn", "msd", "embeddings", "original"), [3, 5]);
        assert_eq!(cache.get("musicnn", "mtt", "embeddings", "pca"), [1, 2]);
        assert_eq!(cache.get("musicnn", "mtt", "taggrams", "original"), [0, 1]);
    }

    #[test]
    fn missing_path_falls_back_to_default() {
        let cache = SelectionCache::new(MemoryStore::new(), [2, 3]);
        assert_eq!(cache.lookup("new-arch", "mtt", "taggrams", "original"), None);
        assert_eq!(cache.get("new-arch", "mtt", "taggrams", "original"), [2, 3]);
    }

    #[test]
    fn malformed_blob_is_replaced() {
        let mut store = MemoryStore::new();
        store.set_item(DIMENSIONS_KEY, "{not json");
        let mut cache = SelectionCache::new(store, [0, 1]);
        cache.initialize(&metadata(), &projections(), [0, 1]);
        assert_eq!(cache.lookup("musicnn", "msd", "taggrams", "pca"), Some([0, 1]));
    }

    #[test]
    fn trigger_mode_defaults_and_persists() {
        let mut cache = SelectionCache::new(MemoryStore::new(), [0, 1]);
        assert_eq!(cache.trigger_mode(TriggerMode::Hover), TriggerMode::Hover);
        assert_eq!(cache.store().get_item(AUDIO_KEY).as_deref(), Some("hover"));

        cache.set_trigger_mode(TriggerMode::Click);
        assert_eq!(cache.trigger_mode(TriggerMode::Hover), TriggerMode::Click);

        cache.set_trigger_mode(TriggerMode::Unset);
        assert_eq!(cache.trigger_mode(TriggerMode::Hover), TriggerMode::Unset);
    }

    #[test]
    fn remember_submit_stores_form_and_dimensions() {
        let mut cache = SelectionCache::new(MemoryStore::new(), [0, 1]);
        let form = SideForm { layer: "embeddings".into(), dimensions: Some([7, 8]), ..SideForm::default() };
        cache.remember_submit(Side::Right, &form);

        assert_eq!(cache.side_form(Side::Right), Some(form));
        assert_eq!(cache.side_form(Side::Left), None);
        assert_eq!(cache.get("musicnn", "mtt", "embeddings", "original"), [7, 8]);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut cache = SelectionCache::new(FileStore::open(&path).unwrap(), [0, 1]);
            cache.set("musicnn", "mtt", "taggrams", "pca", [2, 4]);
            cache.set_trigger_mode(TriggerMode::Click);
        }
        let mut cache = SelectionCache::new(FileStore::open(&path).unwrap(), [0, 1]);
        assert_eq!(cache.get("musicnn", "mtt", "taggrams", "pca"), [2, 4]);
        assert_eq!(cache.trigger_mode(TriggerMode::Hover), TriggerMode::Click);
    }
}
