//! Audio outputs: the page's `<audio>` element in the browser, rodio natively.

use crate::Result;

pub trait AudioSink {
    /// Replace the current source with `url`, load it and start playing
    fn play(&mut self, url: &str) -> Result<()>;
    fn stop(&mut self);
    fn set_volume(&mut self, volume: f32);
    /// Pump pending work (downloads finishing, etc.). Called once per frame.
    fn poll(&mut self) {}
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn play(&mut self, url: &str) -> Result<()> {
        (**self).play(url)
    }

    fn stop(&mut self) {
        (**self).stop();
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume);
    }

    fn poll(&mut self) {
        (**self).poll();
    }
}

/// Remembers requested URLs without producing sound. Used when the build has
/// no audio backend.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    pub played: Vec<String>,
    pub volume: f32,
    pub stopped: usize,
}

impl AudioSink for RecordingSink {
    fn play(&mut self, url: &str) -> Result<()> {
        tracing::info!(url, "no audio backend, not playing");
        self.played.push(url.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped += 1;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::WebAudioSink;

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;

    use super::AudioSink;
    use crate::{Error, Result};

    pub const AUDIO_ELEMENT_ID: &str = "audio";

    pub struct WebAudioSink {
        audio: web_sys::HtmlAudioElement,
        // keeps the onerror handler alive for the element's lifetime
        _on_error: Closure<dyn FnMut(web_sys::Event)>,
    }

    impl WebAudioSink {
        /// Use the page's `<audio id="audio">`, creating a hidden one if absent
        pub fn attach(volume: f32) -> Result<Self> {
            let document = web_sys::window()
                .and_then(|w| w.document())
                .ok_or_else(|| Error::Audio("no document".into()))?;

            let audio = match document
                .get_element_by_id(AUDIO_ELEMENT_ID)
                .and_then(|el| el.dyn_into::<web_sys::HtmlAudioElement>().ok())
            {
                Some(audio) => audio,
                None => {
                    let audio = document
                        .create_element("audio")
                        .map_err(|e| Error::Audio(format!("{e:?}")))?
                        .dyn_into::<web_sys::HtmlAudioElement>()
                        .map_err(|_| Error::Audio("created element is not <audio>".into()))?;
                    audio.set_id(AUDIO_ELEMENT_ID);
                    if let Some(body) = document.body() {
                        body.append_child(&audio).map_err(|e| Error::Audio(format!("{e:?}")))?;
                    }
                    audio
                }
            };

            let on_error = Closure::wrap(Box::new(move |event: web_sys::Event| {
                let src = event
                    .target()
                    .and_then(|t| t.dyn_into::<web_sys::HtmlMediaElement>().ok())
                    .map(|el| el.current_src())
                    .unwrap_or_default();
                tracing::error!(src = %src, "media element error");
            }) as Box<dyn FnMut(web_sys::Event)>);
            audio.set_onerror(Some(on_error.as_ref().unchecked_ref()));
            audio.set_volume(f64::from(volume));

            Ok(Self { audio, _on_error: on_error })
        }
    }

    impl AudioSink for WebAudioSink {
        fn play(&mut self, url: &str) -> Result<()> {
            self.audio.set_src(url);
            self.audio.load();
            // autoplay policy rejections surface through the promise; we only log them
            match self.audio.play() {
                Ok(promise) => {
                    wasm_bindgen_futures::spawn_local(async move {
                        if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                            tracing::warn!(error = ?e, "play() rejected");
                        }
                    });
                    Ok(())
                }
                Err(e) => Err(Error::Audio(format!("{e:?}"))),
            }
        }

        fn stop(&mut self) {
            if let Err(e) = self.audio.pause() {
                tracing::warn!(error = ?e, "pause() failed");
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.audio.set_volume(f64::from(volume));
        }
    }
}

#[cfg(all(not(target_arch = "wasm32"), feature = "native-audio"))]
pub use native::RodioSink;

#[cfg(all(not(target_arch = "wasm32"), feature = "native-audio"))]
mod native {
    use std::io::Cursor;

    use crossbeam::channel::{unbounded, Receiver, Sender};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

    use super::AudioSink;
    use crate::{Error, Result};

    const MAX_AUDIO_BYTES: u64 = 64 * 1024 * 1024;

    type Download = (u64, Result<Vec<u8>>);

    /// Downloads the file on a worker thread, then decodes and plays it
    pub struct RodioSink {
        output: Option<(OutputStream, OutputStreamHandle)>,
        sink: Option<Sink>,
        volume: f32,
        generation: u64,
        tx: Sender<Download>,
        rx: Receiver<Download>,
    }

    impl RodioSink {
        pub fn new(volume: f32) -> Self {
            let (tx, rx) = unbounded();
            Self { output: None, sink: None, volume, generation: 0, tx, rx }
        }

        fn handle(&mut self) -> Result<&OutputStreamHandle> {
            if self.output.is_none() {
                let output = OutputStream::try_default().map_err(|e| Error::Audio(e.to_string()))?;
                self.output = Some(output);
            }
            self.output
                .as_ref()
                .map(|(_, handle)| handle)
                .ok_or_else(|| Error::Audio("no output stream".into()))
        }

        fn start(&mut self, bytes: Vec<u8>) -> Result<()> {
            let source = Decoder::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
            let sink = Sink::try_new(self.handle()?).map_err(|e| Error::Audio(e.to_string()))?;
            sink.set_volume(self.volume);
            sink.append(source);
            sink.play();
            if let Some(previous) = self.sink.replace(sink) {
                previous.stop();
            }
            Ok(())
        }
    }

    impl AudioSink for RodioSink {
        fn play(&mut self, url: &str) -> Result<()> {
            self.generation += 1;
            let generation = self.generation;
            let tx = self.tx.clone();
            let url = url.to_string();
            std::thread::spawn(move || {
                let result = ureq::get(&url)
                    .call()
                    .map_err(Error::from)
                    .and_then(|mut response| {
                        response
                            .body_mut()
                            .with_config()
                            .limit(MAX_AUDIO_BYTES)
                            .read_to_vec()
                            .map_err(Error::from)
                    });
                if tx.send((generation, result)).is_err() {
                    tracing::debug!(generation, "audio player dropped before download finished");
                }
            });
            Ok(())
        }

        fn stop(&mut self) {
            // invalidate downloads still in flight
            self.generation += 1;
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
            if let Some(sink) = &self.sink {
                sink.set_volume(volume);
            }
        }

        fn poll(&mut self) {
            while let Ok((generation, result)) = self.rx.try_recv() {
                if generation != self.generation {
                    continue;
                }
                match result.and_then(|bytes| self.start(bytes)) {
                    Ok(()) => tracing::debug!("playback started"),
                    Err(e) => tracing::error!(error = %e, "native playback failed"),
                }
            }
        }
    }
}
