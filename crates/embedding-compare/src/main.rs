// Native-only binary - not compiled for WASM
#![cfg(not(target_arch = "wasm32"))]

use std::path::PathBuf;

use clap::Parser;
use eframe::NativeOptions;
use embedding_compare::cache::{FileStore, KeyValueStore, MemoryStore};
use embedding_compare::client::{reply_channel, Endpoints, HttpTransport};
use embedding_compare::config::ExplorerConfig;
use embedding_compare::playback::AudioSink;
use embedding_compare::{logging, CompareApp};

#[derive(Parser, Debug)]
#[command(name = "embedding-compare", version, about = "Compare audio embedding plots side by side")]
struct Cli {
    /// Backend base URL, e.g. http://localhost:5000
    #[arg(long, env = "EMBEDDING_COMPARE_SERVER")]
    server: Option<String>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> ExplorerConfig {
    let mut config = match &cli.config {
        Some(path) => ExplorerConfig::load(path).unwrap_or_else(|e| {
            tracing::error!(error = %e, "falling back to default settings");
            ExplorerConfig::default()
        }),
        None => ExplorerConfig::default(),
    };
    if let Some(server) = &cli.server {
        config.server_url.clone_from(server);
    }
    if config.server_url.is_empty() {
        config.server_url = "http://localhost:5000".to_string();
    }
    config.sanitized()
}

fn open_store(config: &ExplorerConfig) -> Box<dyn KeyValueStore> {
    match FileStore::open(&config.store_path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::warn!(path = %config.store_path, error = %e, "state file unusable, keeping state in memory");
            Box::new(MemoryStore::new())
        }
    }
}

#[cfg(feature = "native-audio")]
fn audio_sink(config: &ExplorerConfig) -> Box<dyn AudioSink> {
    Box::new(embedding_compare::playback::RodioSink::new(config.volume))
}

#[cfg(not(feature = "native-audio"))]
fn audio_sink(_config: &ExplorerConfig) -> Box<dyn AudioSink> {
    tracing::warn!("built without native-audio, playback is disabled");
    Box::new(embedding_compare::playback::RecordingSink::default())
}

fn main() -> eframe::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let config = load_config(&cli);
    tracing::info!(server = %config.server_url, store = %config.store_path, "starting embedding-compare v{}", env!("CARGO_PKG_VERSION"));

    let (tx, rx) = reply_channel();
    let transport = HttpTransport::new(Endpoints::new(&config.server_url), tx);
    let store = open_store(&config);
    let sink = audio_sink(&config);

    let native_options = NativeOptions::default();
    eframe::run_native(
        "Embedding Compare",
        native_options,
        Box::new(|_cc| Ok(Box::new(CompareApp::new(config, transport, rx, store, sink)))),
    )
}
