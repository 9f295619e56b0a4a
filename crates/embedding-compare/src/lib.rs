//! Side-by-side explorer for audio embedding plots.
//!
//! Two panels show projections of the same tracks or segments produced by
//! different models. Hover and lasso selection on one panel are mirrored on
//! the other, hovering or clicking a point plays its audio, and the chosen
//! plot dimensions are remembered per model configuration.

pub mod app;
pub mod audio_link;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod coupling;
pub mod error;
pub mod logging;
pub mod model;
pub mod panel;
pub mod playback;
pub mod playlist;
pub mod request;

pub use app::CompareApp;
pub use error::{Error, Result};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
pub const CANVAS_ID: &str = "embedding_compare_canvas";

/// Browser build: same-origin backend, localStorage, the page's `<audio>` element
#[cfg(target_arch = "wasm32")]
pub type WebCompareApp = CompareApp<client::FetchTransport, cache::LocalStorage, Box<dyn playback::AudioSink>>;

#[cfg(target_arch = "wasm32")]
fn build_web_app() -> WebCompareApp {
    let config = config::ExplorerConfig::default();
    let (tx, rx) = client::reply_channel();
    let transport = client::FetchTransport::new(client::Endpoints::new(&config.server_url), tx);
    let store = cache::LocalStorage::open().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "selections will not be remembered");
        cache::LocalStorage
    });
    let sink: Box<dyn playback::AudioSink> = match playback::WebAudioSink::attach(config.volume) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::error!(error = %e, "no audio element, playback disabled");
            Box::new(playback::RecordingSink::default())
        }
    };
    CompareApp::new(config, transport, rx, store, sink)
}

// WASM entry point
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> std::result::Result<(), JsValue> {
    use wasm_bindgen::JsCast;

    console_error_panic_hook::set_once();
    logging::init(None);

    let canvas = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(CANVAS_ID))
        .ok_or_else(|| JsValue::from_str(&format!("no canvas element with id '{CANVAS_ID}'")))?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .map_err(|_| JsValue::from_str(&format!("element with id '{CANVAS_ID}' is not a canvas")))?;

    wasm_bindgen_futures::spawn_local(async move {
        let started = eframe::WebRunner::new()
            .start(
                canvas,
                eframe::WebOptions::default(),
                Box::new(|_cc| Ok(Box::new(build_web_app()))),
            )
            .await;
        if let Err(e) = started {
            tracing::error!(error = ?e, "failed to start eframe");
        }
    });

    Ok(())
}
