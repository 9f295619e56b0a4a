use serde::{Deserialize, Serialize};

use crate::audio_link::TriggerMode;
use crate::model::Dimensions;

/// Runtime settings. Every field has a default so a partial TOML file works.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Base URL of the backend. Empty means same origin (browser build).
    pub server_url: String,
    /// Opacity of points outside a coupled selection
    pub dimmed_opacity: f32,
    pub default_dimensions: Dimensions,
    pub default_trigger: TriggerMode,
    /// Projections that get a cached dimension pair per layer
    pub cached_projections: Vec<String>,
    pub volume: f32,
    /// Native key-value store location
    pub store_path: String,
    /// Native playlist output
    pub playlist_path: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            dimmed_opacity: 0.2,
            default_dimensions: [0, 1],
            default_trigger: TriggerMode::Hover,
            cached_projections: vec!["original".to_string(), "pca".to_string()],
            volume: 0.5,
            store_path: "embedding-compare-state.json".to_string(),
            playlist_path: "playlist.m3u".to_string(),
        }
    }
}

impl ExplorerConfig {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_toml_str(raw: &str) -> crate::Result<Self> {
        toml::from_str(raw).map_err(|e| crate::Error::Config(e.to_string()))
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Clamp values a hand-edited file could push out of range
    pub fn sanitized(mut self) -> Self {
        self.dimmed_opacity = self.dimmed_opacity.clamp(0.0, 1.0);
        self.volume = self.volume.clamp(0.0, 1.0);
        self.server_url = self.server_url.trim_end_matches('/').to_string();
        self
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ExplorerConfig::from_toml_str("server_url = \"http://localhost:5000/\"\nvolume = 0.9\n")
            .unwrap()
            .sanitized();
        assert_eq!(cfg.server_url, "http://localhost:5000");
        assert_eq!(cfg.volume, 0.9);
        assert_eq!(cfg.dimmed_opacity, 0.2);
        assert_eq!(cfg.default_trigger, TriggerMode::Hover);
        assert_eq!(cfg.cached_projections, vec!["original", "pca"]);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ExplorerConfig::from_toml_str("volume = \"loud\"").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn sanitized_clamps_ranges() {
        let cfg = ExplorerConfig { dimmed_opacity: 3.0, volume: -1.0, ..Default::default() }.sanitized();
        assert_eq!(cfg.dimmed_opacity, 1.0);
        assert_eq!(cfg.volume, 0.0);
    }
}
