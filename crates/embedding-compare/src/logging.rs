//! Subscriber setup for both targets.

#[cfg(not(target_arch = "wasm32"))]
pub fn init(level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    // an explicit level wins over RUST_LOG, RUST_LOG over the default
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::init;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::io;

    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;

    /// Buffers one formatted event and hands it to the matching console method on drop
    pub struct ConsoleWriter {
        level: Level,
        buffer: Vec<u8>,
    }

    impl io::Write for ConsoleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for ConsoleWriter {
        fn drop(&mut self) {
            let text = String::from_utf8_lossy(&self.buffer);
            let line = wasm_bindgen::JsValue::from_str(text.trim_end());
            match self.level {
                Level::ERROR => web_sys::console::error_1(&line),
                Level::WARN => web_sys::console::warn_1(&line),
                Level::INFO => web_sys::console::info_1(&line),
                _ => web_sys::console::debug_1(&line),
            }
        }
    }

    pub struct Console;

    impl<'a> MakeWriter<'a> for Console {
        type Writer = ConsoleWriter;

        fn make_writer(&'a self) -> Self::Writer {
            ConsoleWriter { level: Level::INFO, buffer: Vec::new() }
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            ConsoleWriter { level: *meta.level(), buffer: Vec::new() }
        }
    }

    pub fn init(level: Option<&str>) {
        let filter = tracing_subscriber::EnvFilter::new(level.unwrap_or("info"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Console)
            .without_time()
            .with_ansi(false)
            .try_init();
        if installed.is_err() {
            web_sys::console::warn_1(&"tracing subscriber already installed".into());
        }
    }
}
