//! Backend requests.
//!
//! Requests go out through a [`Transport`]; replies come back on a crossbeam
//! channel the app drains once per frame. Every plot and audio request carries
//! a token, and only the newest token of a kind is allowed to touch the UI.

use std::collections::HashMap;

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::de::DeserializeOwned;

use crate::model::{AudioInfo, EntityId, Metadata, PlotResponse, RequestPayload, Side};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestKind {
    Plot(Side),
    Audio,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

/// Newest token per request kind
#[derive(Debug, Default)]
pub struct RequestTokens {
    counter: u64,
    latest: HashMap<RequestKind, u64>,
}

impl RequestTokens {
    pub fn issue(&mut self, kind: RequestKind) -> RequestToken {
        self.issue_many(&[kind])
    }

    /// One token covering several kinds, e.g. a plot request for both sides
    pub fn issue_many(&mut self, kinds: &[RequestKind]) -> RequestToken {
        self.counter += 1;
        for kind in kinds {
            self.latest.insert(*kind, self.counter);
        }
        RequestToken(self.counter)
    }

    pub fn issue_plot(&mut self, sides: &[Side]) -> RequestToken {
        let kinds: Vec<RequestKind> = sides.iter().map(|s| RequestKind::Plot(*s)).collect();
        self.issue_many(&kinds)
    }

    pub fn is_current(&self, kind: RequestKind, token: RequestToken) -> bool {
        self.latest.get(&kind) == Some(&token.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ApiRequest {
    Plot { token: RequestToken, payload: RequestPayload },
    Audio { token: RequestToken, entity: EntityId },
    Metadata,
    Playlist { entities: Vec<EntityId> },
}

impl ApiRequest {
    /// In-flight requests sharing a key supersede each other
    pub fn supersede_key(&self) -> Option<String> {
        match self {
            ApiRequest::Plot { payload, .. } => {
                let sides: Vec<&str> = payload.models.keys().map(|s| s.as_str()).collect();
                Some(format!("plot:{}", sides.join(",")))
            }
            ApiRequest::Audio { .. } => Some("audio".to_string()),
            ApiRequest::Metadata | ApiRequest::Playlist { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum ApiReply {
    Plot { token: RequestToken, payload: RequestPayload, result: Result<PlotResponse> },
    Audio { token: RequestToken, entity: EntityId, result: Result<AudioInfo> },
    Metadata(Result<Metadata>),
    Playlist(Result<String>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A request reduced to what any HTTP client needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpCall {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: &str) -> Self {
        Self { base: base.trim_end_matches('/').to_string() }
    }

    pub fn plot(&self) -> String {
        format!("{}/plot-advanced", self.base)
    }

    /// Entity ids may contain slashes (`segment/3/42`); they map onto nested routes
    pub fn audio(&self, entity: &str) -> String {
        format!("{}/audio/{}", self.base, entity.trim_start_matches('/'))
    }

    pub fn metadata(&self) -> String {
        format!("{}/metadata", self.base)
    }

    pub fn playlist(&self) -> String {
        format!("{}/audio/playlist", self.base)
    }

    pub fn call_for(&self, request: &ApiRequest) -> Result<HttpCall> {
        Ok(match request {
            ApiRequest::Plot { payload, .. } => HttpCall {
                method: Method::Post,
                url: self.plot(),
                body: Some(serde_json::to_string(payload)?),
            },
            ApiRequest::Audio { entity, .. } => HttpCall { method: Method::Get, url: self.audio(entity), body: None },
            ApiRequest::Metadata => HttpCall { method: Method::Get, url: self.metadata(), body: None },
            ApiRequest::Playlist { entities } => HttpCall {
                method: Method::Post,
                url: self.playlist(),
                body: Some(serde_json::to_string(&serde_json::json!({ "segments": entities }))?),
            },
        })
    }
}

fn decode<T: DeserializeOwned>(body: Result<String>) -> Result<T> {
    body.and_then(|text| serde_json::from_str(&text).map_err(Error::from))
}

/// Turn a raw response body into the typed reply for `request`
pub fn complete(request: ApiRequest, body: Result<String>) -> ApiReply {
    match request {
        ApiRequest::Plot { token, payload } => ApiReply::Plot { token, payload, result: decode(body) },
        ApiRequest::Audio { token, entity } => ApiReply::Audio { token, entity, result: decode(body) },
        ApiRequest::Metadata => ApiReply::Metadata(decode(body)),
        ApiRequest::Playlist { .. } => ApiReply::Playlist(body),
    }
}

pub fn reply_channel() -> (Sender<ApiReply>, Receiver<ApiReply>) {
    unbounded()
}

pub trait Transport {
    /// Fire the request. The reply arrives later on the transport's channel.
    fn dispatch(&self, request: ApiRequest);
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::HttpTransport;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use crossbeam::channel::Sender;
    use web_time::Instant;

    use super::{complete, ApiReply, ApiRequest, Endpoints, HttpCall, Method, Transport};
    use crate::Result;

    const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

    /// Blocking `ureq` calls on short-lived worker threads
    pub struct HttpTransport {
        endpoints: Endpoints,
        tx: Sender<ApiReply>,
    }

    impl HttpTransport {
        pub fn new(endpoints: Endpoints, tx: Sender<ApiReply>) -> Self {
            Self { endpoints, tx }
        }
    }

    fn execute(call: &HttpCall) -> Result<String> {
        let mut response = match (call.method, &call.body) {
            (Method::Post, Some(body)) => ureq::post(&call.url)
                .header("Content-Type", "application/json")
                .send(body.as_str())?,
            (Method::Post, None) => ureq::post(&call.url).send_empty()?,
            (Method::Get, _) => ureq::get(&call.url).call()?,
        };
        let text = response.body_mut().with_config().limit(MAX_BODY_BYTES).read_to_string()?;
        Ok(text)
    }

    impl Transport for HttpTransport {
        fn dispatch(&self, request: ApiRequest) {
            let tx = self.tx.clone();
            let call = self.endpoints.call_for(&request);
            std::thread::spawn(move || {
                let started = Instant::now();
                let body = call.and_then(|call| {
                    let result = execute(&call);
                    tracing::debug!(
                        method = call.method.as_str(),
                        url = %call.url,
                        ok = result.is_ok(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request finished"
                    );
                    result
                });
                if tx.send(complete(request, body)).is_err() {
                    tracing::debug!("reply receiver dropped");
                }
            });
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::FetchTransport;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use crossbeam::channel::Sender;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_time::Instant;

    use super::{complete, ApiReply, ApiRequest, Endpoints, HttpCall, Transport};
    use crate::{Error, Result};

    fn js_error(e: JsValue) -> Error {
        Error::Network(e.as_string().unwrap_or_else(|| format!("{e:?}")))
    }

    async fn fetch_text(call: HttpCall, signal: Option<web_sys::AbortSignal>) -> Result<String> {
        let init = web_sys::RequestInit::new();
        init.set_method(call.method.as_str());
        init.set_mode(web_sys::RequestMode::Cors);
        if let Some(body) = &call.body {
            init.set_body(&JsValue::from_str(body));
        }
        init.set_signal(signal.as_ref());

        let request = web_sys::Request::new_with_str_and_init(&call.url, &init).map_err(js_error)?;
        request.headers().set("Content-Type", "application/json").map_err(js_error)?;

        let window = web_sys::window().ok_or_else(|| Error::Network("no window".into()))?;
        let value = JsFuture::from(window.fetch_with_request(&request)).await.map_err(js_error)?;
        let response: web_sys::Response = value.dyn_into().map_err(js_error)?;
        if !response.ok() {
            return Err(Error::Http { status: response.status() });
        }
        let text = JsFuture::from(response.text().map_err(js_error)?).await.map_err(js_error)?;
        text.as_string().ok_or_else(|| Error::Network("response body is not text".into()))
    }

    /// `fetch` on the page's event loop. A newer request with the same
    /// supersede key aborts the one still in flight.
    pub struct FetchTransport {
        endpoints: Endpoints,
        tx: Sender<ApiReply>,
        in_flight: Rc<RefCell<HashMap<String, web_sys::AbortController>>>,
    }

    impl FetchTransport {
        pub fn new(endpoints: Endpoints, tx: Sender<ApiReply>) -> Self {
            Self { endpoints, tx, in_flight: Rc::new(RefCell::new(HashMap::new())) }
        }

        fn arm(&self, key: Option<String>) -> Option<web_sys::AbortSignal> {
            let key = key?;
            let mut in_flight = self.in_flight.borrow_mut();
            if let Some(previous) = in_flight.remove(&key) {
                tracing::debug!(key = %key, "aborting superseded request");
                previous.abort();
            }
            let controller = web_sys::AbortController::new().ok()?;
            let signal = controller.signal();
            in_flight.insert(key, controller);
            Some(signal)
        }
    }

    impl Transport for FetchTransport {
        fn dispatch(&self, request: ApiRequest) {
            let tx = self.tx.clone();
            let call = self.endpoints.call_for(&request);
            let signal = self.arm(request.supersede_key());
            wasm_bindgen_futures::spawn_local(async move {
                let started = Instant::now();
                let body = match call {
                    Ok(call) => {
                        let url = call.url.clone();
                        let result = fetch_text(call, signal).await;
                        tracing::debug!(url = %url, ok = result.is_ok(), elapsed_ms = started.elapsed().as_millis() as u64, "request finished");
                        result
                    }
                    Err(e) => Err(e),
                };
                if tx.send(complete(request, body)).is_err() {
                    tracing::debug!("reply receiver dropped");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlotConfiguration;

    fn payload(sides: &[Side]) -> RequestPayload {
        let mut payload = RequestPayload::default();
        for side in sides {
            payload.models.insert(
                *side,
                PlotConfiguration {
                    side: Some(*side),
                    architecture: "musicnn".into(),
                    dataset: "mtt".into(),
                    layer: "taggrams".into(),
                    projection: "pca".into(),
                    dimensions: Some([0, 1]),
                },
            );
        }
        payload
    }

    #[test]
    fn newer_token_supersedes_older() {
        let mut tokens = RequestTokens::default();
        let first = tokens.issue(RequestKind::Audio);
        assert!(tokens.is_current(RequestKind::Audio, first));
        let second = tokens.issue(RequestKind::Audio);
        assert!(!tokens.is_current(RequestKind::Audio, first));
        assert!(tokens.is_current(RequestKind::Audio, second));
        assert!(!tokens.is_current(RequestKind::Plot(Side::Left), second));
    }

    #[test]
    fn plot_tokens_are_per_side() {
        let mut tokens = RequestTokens::default();
        let both = tokens.issue_plot(&Side::BOTH);
        let left_only = tokens.issue_plot(&[Side::Left]);
        assert!(!tokens.is_current(RequestKind::Plot(Side::Left), both));
        assert!(tokens.is_current(RequestKind::Plot(Side::Right), both));
        assert!(tokens.is_current(RequestKind::Plot(Side::Left), left_only));
    }

    #[test]
    fn endpoints_build_urls() {
        let endpoints = Endpoints::new("http://localhost:5000/");
        assert_eq!(endpoints.plot(), "http://localhost:5000/plot-advanced");
        assert_eq!(endpoints.audio("segment/3/42"), "http://localhost:5000/audio/segment/3/42");
        assert_eq!(endpoints.audio("/track/7"), "http://localhost:5000/audio/track/7");
        assert_eq!(endpoints.metadata(), "http://localhost:5000/metadata");
        assert_eq!(Endpoints::new("").metadata(), "/metadata");
    }

    #[test]
    fn calls_carry_json_bodies() {
        let endpoints = Endpoints::new("");
        let plot = endpoints
            .call_for(&ApiRequest::Plot { token: RequestToken::default(), payload: payload(&[Side::Left]) })
            .unwrap();
        assert_eq!(plot.method, Method::Post);
        let body: serde_json::Value = serde_json::from_str(plot.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["models"]["left"]["projection"], "pca");

        let playlist = endpoints.call_for(&ApiRequest::Playlist { entities: vec!["a".into()] }).unwrap();
        assert_eq!(playlist.url, "/audio/playlist");
        assert_eq!(playlist.body.as_deref(), Some(r#"{"segments":["a"]}"#));

        let audio = endpoints
            .call_for(&ApiRequest::Audio { token: RequestToken::default(), entity: "9".into() })
            .unwrap();
        assert_eq!(audio, HttpCall { method: Method::Get, url: "/audio/9".into(), body: None });
    }

    #[test]
    fn supersede_keys() {
        let left = ApiRequest::Plot { token: RequestToken::default(), payload: payload(&[Side::Left]) };
        let both = ApiRequest::Plot { token: RequestToken::default(), payload: payload(&Side::BOTH) };
        assert_eq!(left.supersede_key().as_deref(), Some("plot:left"));
        assert_eq!(both.supersede_key().as_deref(), Some("plot:left,right"));
        assert_eq!(ApiRequest::Metadata.supersede_key(), None);
    }

    #[test]
    fn complete_decodes_by_kind() {
        let token = RequestToken::default();
        let reply = complete(
            ApiRequest::Audio { token, entity: "7".into() },
            Ok(r#"{"url": "http://a/7.mp3", "text": "Artist - Title"}"#.into()),
        );
        match reply {
            ApiReply::Audio { entity, result, .. } => {
                assert_eq!(entity, "7");
                assert_eq!(result.unwrap().text, "Artist - Title");
            }
            other => panic!("unexpected reply {other:?}"),
        }

        let reply = complete(ApiRequest::Metadata, Ok("{oops".into()));
        assert!(matches!(reply, ApiReply::Metadata(Err(Error::Decode(_)))));

        let reply = complete(
            ApiRequest::Plot { token, payload: payload(&[Side::Right]) },
            Err(Error::Http { status: 404 }),
        );
        match reply {
            ApiReply::Plot { payload, result, .. } => {
                assert_eq!(payload.sides(), vec![Side::Right]);
                assert_eq!(result.unwrap_err().status(), Some(404));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
