//! Links plot interaction to audio playback.
//!
//! One trigger mode is shared by both panels. Each panel owns a listener set;
//! rebinding always removes both listener kinds before attaching the one the
//! current mode asks for, so a panel never ends up with hover and click at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::client::{RequestKind, RequestToken, RequestTokens};
use crate::model::{AudioInfo, EntityId, Side};
use crate::panel::PanelEvent;
use crate::playback::AudioSink;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[serde(rename = "")]
    Unset,
    #[default]
    Hover,
    Click,
}

impl TriggerMode {
    pub const ALL: [TriggerMode; 3] = [TriggerMode::Hover, TriggerMode::Click, TriggerMode::Unset];

    /// Unknown values behave as no listener at all
    pub fn parse(raw: &str) -> TriggerMode {
        match raw.trim() {
            "hover" => TriggerMode::Hover,
            "click" => TriggerMode::Click,
            _ => TriggerMode::Unset,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerMode::Unset => "",
            TriggerMode::Hover => "hover",
            TriggerMode::Click => "click",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TriggerMode::Unset => "Off",
            TriggerMode::Hover => "Hover",
            TriggerMode::Click => "Click",
        }
    }
}

/// Listeners attached to one panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerSet {
    pub hover: bool,
    pub click: bool,
}

impl ListenerSet {
    pub fn active(self) -> usize {
        usize::from(self.hover) + usize::from(self.click)
    }
}

#[derive(Debug, Default)]
pub struct AudioLinkBinder {
    mode: TriggerMode,
    listeners: BTreeMap<Side, ListenerSet>,
}

impl AudioLinkBinder {
    pub fn new(mode: TriggerMode) -> Self {
        Self { mode, listeners: BTreeMap::new() }
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn listeners(&self, side: Side) -> ListenerSet {
        self.listeners.get(&side).copied().unwrap_or_default()
    }

    /// Remove both listener kinds, then attach the one for the current mode
    pub fn rebind(&mut self, side: Side) {
        let slot = self.listeners.entry(side).or_default();
        if slot.active() > 0 {
            tracing::debug!(panel = side.plot_id(), "removing audio listeners");
        }
        *slot = ListenerSet::default();
        match self.mode {
            TriggerMode::Hover => slot.hover = true,
            TriggerMode::Click => slot.click = true,
            TriggerMode::Unset => {}
        }
    }

    /// Switch mode and rebind every panel that is currently mounted
    pub fn set_mode(&mut self, mode: TriggerMode) {
        if mode == self.mode {
            return;
        }
        tracing::info!(mode = mode.as_str(), "changing audio bind");
        self.mode = mode;
        let sides: Vec<Side> = self.listeners.keys().copied().collect();
        for side in sides {
            self.rebind(side);
        }
    }

    /// Panel was unmounted or is about to be redrawn
    pub fn detach(&mut self, side: Side) {
        self.listeners.remove(&side);
    }

    /// Entity to play for this event, if a matching listener is attached
    pub fn entity_for(&self, side: Side, event: &PanelEvent) -> Option<EntityId> {
        let listeners = self.listeners(side);
        let hits = match event {
            PanelEvent::Hover { points } if listeners.hover => points,
            PanelEvent::Click { points } if listeners.click => points,
            _ => return None,
        };
        hits.first().and_then(|hit| hit.entity.clone())
    }
}

/// Owns the audio output and the track-info text. Replies for anything but
/// the newest audio request are dropped.
pub struct AudioPlayer<S: AudioSink> {
    sink: S,
    info_text: String,
    current: Option<EntityId>,
}

impl<S: AudioSink> AudioPlayer<S> {
    pub fn new(sink: S) -> Self {
        Self { sink, info_text: String::new(), current: None }
    }

    pub fn info_text(&self) -> &str {
        &self.info_text
    }

    pub fn current(&self) -> Option<&EntityId> {
        self.current.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Apply an audio reply. Returns false when the reply was stale or failed.
    pub fn on_reply(
        &mut self,
        tokens: &RequestTokens,
        token: RequestToken,
        entity: &str,
        result: crate::Result<AudioInfo>,
    ) -> bool {
        if !tokens.is_current(RequestKind::Audio, token) {
            tracing::debug!(entity, "dropping stale audio reply");
            return false;
        }
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(entity, error = %e, "audio fetch failed");
                return false;
            }
        };
        tracing::info!(entity, url = %info.url, "got audio url");
        if let Err(e) = self.sink.play(&info.url) {
            tracing::error!(entity, error = %e, "playback failed");
        }
        self.info_text = info.text;
        self.current = Some(entity.to_string());
        true
    }

    pub fn stop(&mut self) {
        self.sink.stop();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    pub fn poll(&mut self) {
        self.sink.poll();
    }
}
