use std::collections::BTreeSet;

use crossbeam::channel::Receiver;
use eframe::App;
use egui::{Align2, CentralPanel, ComboBox, Context, DragValue, ScrollArea, Slider, TopBottomPanel, Window};

use crate::audio_link::{AudioLinkBinder, AudioPlayer, TriggerMode};
use crate::cache::{KeyValueStore, SelectionCache};
use crate::catalog::{self, DimensionChoice};
use crate::client::{ApiReply, ApiRequest, RequestKind, RequestToken, Transport};
use crate::config::ExplorerConfig;
use crate::coupling::CouplingBinder;
use crate::model::{Dimensions, EntityId, HighlightCatalog, Metadata, PlotResponse, RequestPayload, Side};
use crate::panel::{PanelEvent, PlotPanel};
use crate::playback::AudioSink;
use crate::playlist;
use crate::request::{build_payload, highlight_options, DataForm, HighlightForm, SideForm};

pub struct CompareApp<T: Transport, S: KeyValueStore, A: AudioSink> {
    config: ExplorerConfig,
    transport: T,
    replies: Receiver<ApiReply>,
    in_flight: usize,
    tokens: crate::client::RequestTokens,
    cache: SelectionCache<S>,
    metadata: Option<Metadata>,

    left_form: SideForm,
    right_form: SideForm,
    data_form: DataForm,
    highlight_form: HighlightForm,
    highlight_catalog: HighlightCatalog,

    left: PlotPanel,
    right: PlotPanel,
    loading: BTreeSet<Side>,
    coupling: CouplingBinder,
    audio_link: AudioLinkBinder,
    player: AudioPlayer<A>,
    volume: f32,

    // message of the modal alert, if one is open
    error: Option<String>,
}

impl<T: Transport, S: KeyValueStore, A: AudioSink> CompareApp<T, S, A> {
    /// Restore persisted state and ask the backend for its catalog
    pub fn new(config: ExplorerConfig, transport: T, replies: Receiver<ApiReply>, store: S, sink: A) -> Self {
        let mut cache = SelectionCache::new(store, config.default_dimensions);
        let trigger = cache.trigger_mode(config.default_trigger);
        let left_form = cache.side_form(Side::Left).unwrap_or_default();
        let right_form = cache.side_form(Side::Right).unwrap_or_default();

        let mut player = AudioPlayer::new(sink);
        player.set_volume(config.volume);

        let mut app = Self {
            transport,
            replies,
            in_flight: 0,
            tokens: Default::default(),
            cache,
            metadata: None,
            left_form,
            right_form,
            data_form: DataForm::default(),
            highlight_form: HighlightForm { trigger, ..HighlightForm::default() },
            highlight_catalog: HighlightCatalog::new(),
            left: PlotPanel::new(Side::Left, config.dimmed_opacity),
            right: PlotPanel::new(Side::Right, config.dimmed_opacity),
            loading: BTreeSet::new(),
            coupling: CouplingBinder::new(config.dimmed_opacity),
            audio_link: AudioLinkBinder::new(trigger),
            player,
            volume: config.volume,
            error: None,
            config,
        };
        tracing::info!(trigger = trigger.as_str(), "loading metadata");
        app.dispatch(ApiRequest::Metadata);
        app
    }

    fn dispatch(&mut self, request: ApiRequest) {
        self.in_flight += 1;
        self.transport.dispatch(request);
    }

    pub fn panel(&self, side: Side) -> &PlotPanel {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn panel_mut(&mut self, side: Side) -> &mut PlotPanel {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn form(&self, side: Side) -> &SideForm {
        match side {
            Side::Left => &self.left_form,
            Side::Right => &self.right_form,
        }
    }

    pub fn form_mut(&mut self, side: Side) -> &mut SideForm {
        match side {
            Side::Left => &mut self.left_form,
            Side::Right => &mut self.right_form,
        }
    }

    pub fn data_form_mut(&mut self) -> &mut DataForm {
        &mut self.data_form
    }

    pub fn highlight_form(&self) -> &HighlightForm {
        &self.highlight_form
    }

    pub fn highlight_form_mut(&mut self) -> &mut HighlightForm {
        &mut self.highlight_form
    }

    pub fn highlight_catalog(&self) -> &HighlightCatalog {
        &self.highlight_catalog
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn cache(&self) -> &SelectionCache<S> {
        &self.cache
    }

    pub fn coupling(&self) -> &CouplingBinder {
        &self.coupling
    }

    pub fn audio_link(&self) -> &AudioLinkBinder {
        &self.audio_link
    }

    pub fn player(&self) -> &AudioPlayer<A> {
        &self.player
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn is_loading(&self, side: Side) -> bool {
        self.loading.contains(&side)
    }

    /// Send the plot request for `sides`
    pub fn submit(&mut self, sides: &[Side]) {
        let payload = build_payload(sides, &self.left_form, &self.right_form, &self.data_form, &self.highlight_form);
        let token = self.tokens.issue_plot(sides);
        tracing::info!(sides = ?payload.sides(), highlight = payload.highlight.len(), "loading plot");
        self.loading.extend(sides.iter().copied());
        self.dispatch(ApiRequest::Plot { token, payload });
    }

    /// `form-left` / `form-right` reload only their own panel
    pub fn submit_side(&mut self, side: Side) {
        self.submit(&[side]);
    }

    /// New filters invalidate the highlight choices
    pub fn submit_data(&mut self) {
        tracing::debug!("highlight reset");
        self.highlight_form.reset();
        self.submit(&Side::BOTH);
    }

    pub fn submit_highlight(&mut self) {
        self.submit(&Side::BOTH);
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) {
        self.highlight_form.trigger = mode;
        self.cache.set_trigger_mode(mode);
        self.audio_link.set_mode(mode);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.player.set_volume(self.volume);
    }

    pub fn select_highlight_entity(&mut self, entity: Option<String>) {
        self.highlight_form.select_entity(&self.highlight_catalog, entity);
    }

    /// Re-read the cached dimensions after a selector change on `side`
    pub fn refresh_dimensions(&mut self, side: Side) {
        let Some(metadata) = self.metadata.as_ref() else {
            return;
        };
        let cached = &self.config.cached_projections;
        let default = self.config.default_dimensions;
        let form = match side {
            Side::Left => &mut self.left_form,
            Side::Right => &mut self.right_form,
        };
        catalog::snap_form(metadata, form);
        let stored = if cached.contains(&form.projection) {
            Some(self.cache.get(&form.architecture, &form.dataset, &form.layer, &form.projection))
        } else {
            self.cache.lookup(&form.architecture, &form.dataset, &form.layer, &form.projection)
        };
        let choice = catalog::dimension_choices(metadata, form);
        form.dimensions = choice.resolve(stored).or_else(|| choice.resolve(Some(default)));
    }

    pub fn request_audio(&mut self, entity: EntityId) {
        let token = self.tokens.issue(RequestKind::Audio);
        tracing::debug!(entity = %entity, "requesting audio");
        self.dispatch(ApiRequest::Audio { token, entity });
    }

    pub fn export_playlist(&mut self) {
        let left = self.left.entities();
        let right = self.right.entities();
        if let Some(request) = playlist::playlist_request(&left, &right) {
            self.dispatch(request);
        }
    }

    /// Route one panel's events through coupling and the audio link
    pub fn handle_panel_events(&mut self, side: Side, events: Vec<PanelEvent>) {
        for event in events {
            let counts = self.panel(side).shape();
            for (destination, command) in self.coupling.dispatch(side, &event, &counts) {
                self.panel_mut(destination).apply(command);
            }
            if let Some(entity) = self.audio_link.entity_for(side, &event) {
                self.request_audio(entity);
            }
        }
    }

    /// Drain every reply that arrived since the last frame
    pub fn poll_replies(&mut self) {
        while let Ok(reply) = self.replies.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.handle_reply(reply);
        }
    }

    fn handle_reply(&mut self, reply: ApiReply) {
        match reply {
            ApiReply::Plot { token, payload, result } => self.on_plot(token, payload, result),
            ApiReply::Audio { token, entity, result } => {
                self.player.on_reply(&self.tokens, token, &entity, result);
            }
            ApiReply::Metadata(Ok(metadata)) => self.on_metadata(metadata),
            ApiReply::Metadata(Err(e)) => {
                tracing::error!(error = %e, "failed to load metadata");
                self.error = Some(e.user_message());
            }
            ApiReply::Playlist(Ok(body)) => self.save_playlist(&body),
            ApiReply::Playlist(Err(e)) => tracing::error!(error = %e, "playlist request failed"),
        }
    }

    fn on_metadata(&mut self, metadata: Metadata) {
        tracing::info!(architectures = metadata.architectures.len(), datasets = metadata.datasets.len(), "got metadata");
        self.cache.initialize(&metadata, &self.config.cached_projections, self.config.default_dimensions);
        self.metadata = Some(metadata);
        for side in Side::BOTH {
            self.refresh_dimensions(side);
        }
        self.submit(&Side::BOTH);
    }

    fn on_plot(&mut self, token: RequestToken, payload: RequestPayload, result: crate::Result<PlotResponse>) {
        let current: Vec<Side> = payload
            .sides()
            .into_iter()
            .filter(|side| self.tokens.is_current(RequestKind::Plot(*side), token))
            .collect();
        if current.is_empty() {
            tracing::debug!(sides = ?payload.sides(), "dropping stale plot reply");
            return;
        }
        for side in &current {
            self.loading.remove(side);
        }

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(status = ?e.status(), error = %e, "plot request failed");
                self.error = Some(e.user_message());
                return;
            }
        };

        let mut rendered = Vec::new();
        for side in current {
            let Some(figure) = response.plots.remove(&side) else {
                tracing::warn!(panel = side.plot_id(), "response has no plot for panel");
                continue;
            };
            self.panel_mut(side).render(figure);
            if let Some(config) = payload.models.get(&side) {
                self.cache.remember_submit(side, &SideForm::from(config));
            }
            rendered.push(side);
        }

        for side in Side::BOTH {
            self.panel_mut(side).set_highlight(payload.highlight.iter().cloned());
        }
        self.highlight_catalog = response.highlight;
        if let Some(entity) = self.highlight_form.entity.as_deref() {
            // keep the chosen items, only refresh what is offered
            self.highlight_form.options = highlight_options(&self.highlight_catalog, entity);
        }

        self.rebind(&rendered);
    }

    /// Drop and rebuild the bindings of freshly rendered panels
    fn rebind(&mut self, rendered: &[Side]) {
        for side in rendered {
            self.coupling.teardown(*side);
            self.audio_link.rebind(*side);
        }
        if rendered.is_empty() || self.left.figure().is_none() || self.right.figure().is_none() {
            return;
        }
        // teardown removed both directions, so both get rebuilt
        let (left, right) = (self.left.shape(), self.right.shape());
        for (source, destination, source_shape, destination_shape) in
            [(Side::Left, Side::Right, &left, &right), (Side::Right, Side::Left, &right, &left)]
        {
            self.coupling.bind_hover(source, destination, source_shape, destination_shape);
            self.coupling.bind_select(source, destination, source_shape, destination_shape);
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn save_playlist(&mut self, body: &str) {
        let path = std::path::PathBuf::from(&self.config.playlist_path);
        if let Err(e) = playlist::save_playlist(body, &path) {
            tracing::error!(error = %e, "failed to save playlist");
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn save_playlist(&mut self, body: &str) {
        if let Err(e) = playlist::save_playlist(body, playlist::PLAYLIST_FILE_NAME) {
            tracing::error!(error = %e, "failed to offer playlist");
        }
    }

    fn side_form_ui(&mut self, ui: &mut egui::Ui, side: Side) {
        let metadata = self.metadata.clone().unwrap_or_default();
        let form = self.form_mut(side).clone();
        let mut edited = form.clone();

        ui.heading(match side {
            Side::Left => "Left",
            Side::Right => "Right",
        });
        let architectures = or_current(catalog::architectures(&metadata), &form.architecture);
        let datasets = or_current(catalog::allowed_datasets(&metadata, &form.architecture), &form.dataset);
        let layers = or_current(catalog::allowed_layers(&metadata, &form.architecture), &form.layer);
        let projections = catalog::projections(&metadata);

        let mut selectors_changed = false;
        selectors_changed |= choice_combo(ui, (side.form_id(), "architecture"), "Architecture", &mut edited.architecture, &architectures);
        selectors_changed |= choice_combo(ui, (side.form_id(), "dataset"), "Dataset", &mut edited.dataset, &datasets);
        selectors_changed |= choice_combo(ui, (side.form_id(), "layer"), "Layer", &mut edited.layer, &layers);
        selectors_changed |= choice_combo(ui, (side.form_id(), "projection"), "Projection", &mut edited.projection, &projections);

        let choice = catalog::dimension_choices(&metadata, &edited);
        dimension_ui(ui, side.form_id(), &choice, &mut edited.dimensions);

        let submitted = ui.button("Plot").clicked();
        *self.form_mut(side) = edited;
        if selectors_changed {
            self.refresh_dimensions(side);
        }
        if submitted {
            self.submit_side(side);
        }
    }

    fn data_form_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Data");
        let tags: BTreeSet<String> = self
            .metadata
            .iter()
            .flat_map(|m| m.datasets.values())
            .flat_map(|d| d.tags.iter().cloned())
            .collect();
        let label = if self.data_form.tags.is_empty() { "Tags".to_string() } else { format!("Tags ({})", self.data_form.tags.len()) };
        ui.menu_button(label, |ui| {
            ScrollArea::vertical().max_height(240.0).show(ui, |ui| {
                for tag in &tags {
                    let mut checked = self.data_form.tags.contains(tag);
                    if ui.checkbox(&mut checked, tag.as_str()).changed() {
                        if checked {
                            self.data_form.tags.push(tag.clone());
                        } else {
                            self.data_form.tags.retain(|t| t != tag);
                        }
                    }
                }
            });
        });
        ui.horizontal(|ui| {
            ui.label("Artists");
            ui.text_edit_singleline(&mut self.data_form.artists);
        });
        ui.horizontal(|ui| {
            ui.label("Sparse");
            let mut sparse = self.data_form.sparse.clone().unwrap_or_default();
            if ui.text_edit_singleline(&mut sparse).changed() {
                self.data_form.sparse = Some(sparse).filter(|s| !s.is_empty());
            }
        });
        ui.checkbox(&mut self.data_form.webgl, "WebGL");
        if ui.button("Apply filters").clicked() {
            self.submit_data();
        }
    }

    fn highlight_form_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Highlight");
        let current = self.highlight_form.entity.clone();
        let mut chosen = current.clone();
        ComboBox::from_id_salt("highlight-entity")
            .selected_text(chosen.clone().unwrap_or_else(|| "(none)".to_string()))
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut chosen, None, "(none)");
                for category in self.highlight_catalog.keys() {
                    ui.selectable_value(&mut chosen, Some(category.clone()), category.as_str());
                }
            });
        if chosen != current {
            self.select_highlight_entity(chosen);
        }

        let options = self.highlight_form.options.clone();
        ScrollArea::vertical().id_salt("highlight-items").max_height(120.0).show(ui, |ui| {
            for option in &options {
                let mut checked = self.highlight_form.is_selected(&option.value);
                if ui.checkbox(&mut checked, option.label.as_str()).changed() {
                    self.highlight_form.toggle(&option.value);
                }
            }
        });

        let mut trigger = self.highlight_form.trigger;
        ui.horizontal(|ui| {
            ui.label("Play on");
            for mode in TriggerMode::ALL {
                ui.radio_value(&mut trigger, mode, mode.label());
            }
        });
        if trigger != self.highlight_form.trigger {
            self.set_trigger_mode(trigger);
        }
        if ui.button("Highlight").clicked() {
            self.submit_highlight();
        }
    }

    fn track_info_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let info = self.player.info_text();
            ui.label(if info.is_empty() { "Nothing playing" } else { info });
            ui.separator();
            let mut volume = self.volume;
            if ui.add(Slider::new(&mut volume, 0.0..=1.0).text("Volume")).changed() {
                self.set_volume(volume);
            }
            if ui.button("Stop").clicked() {
                self.player.stop();
            }
            ui.separator();
            if ui.button("Playlist").clicked() {
                self.export_playlist();
            }
        });
    }
}

impl<T: Transport, S: KeyValueStore, A: AudioSink> App for CompareApp<T, S, A> {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.poll_replies();
        self.player.poll();

        if let Some(message) = self.error.clone() {
            Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(message);
                    if ui.button("OK").clicked() {
                        self.dismiss_error();
                    }
                });
        }

        TopBottomPanel::top("forms").resizable(true).show(ctx, |ui| {
            ui.columns(4, |columns| {
                self.side_form_ui(&mut columns[0], Side::Left);
                self.data_form_ui(&mut columns[1]);
                self.highlight_form_ui(&mut columns[2]);
                self.side_form_ui(&mut columns[3], Side::Right);
            });
        });

        TopBottomPanel::bottom("track-info").show(ctx, |ui| self.track_info_ui(ui));

        let mut events = (Vec::new(), Vec::new());
        CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                for (column, side) in columns.iter_mut().zip(Side::BOTH) {
                    if self.is_loading(side) {
                        column.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Loading");
                        });
                    }
                }
                events.0 = self.left.show(&mut columns[0]);
                events.1 = self.right.show(&mut columns[1]);
            });
        });
        self.handle_panel_events(Side::Left, events.0);
        self.handle_panel_events(Side::Right, events.1);

        // replies arrive off the UI thread; keep polling while any are due
        if self.in_flight > 0 {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }
    }
}

fn or_current(mut options: Vec<String>, current: &str) -> Vec<String> {
    if options.is_empty() {
        options.push(current.to_string());
    }
    options
}

fn choice_combo(ui: &mut egui::Ui, id: impl std::hash::Hash, label: &str, current: &mut String, options: &[String]) -> bool {
    let before = current.clone();
    ui.horizontal(|ui| {
        ui.label(label);
        ComboBox::from_id_salt(id).selected_text(current.clone()).show_ui(ui, |ui| {
            for option in options {
                ui.selectable_value(current, option.clone(), option.as_str());
            }
        });
    });
    *current != before
}

fn dimension_ui(ui: &mut egui::Ui, form_id: &str, choice: &DimensionChoice, dims: &mut Option<Dimensions>) {
    let mut value = dims.unwrap_or([0, 1]);
    match choice {
        DimensionChoice::Fixed(_) => {
            ui.label("Dimensions fixed by projection");
            return;
        }
        DimensionChoice::Unavailable => {
            ui.label("No dimension info");
            return;
        }
        DimensionChoice::Index { size } => {
            let max = size.saturating_sub(1);
            ui.horizontal(|ui| {
                ui.label("x");
                ui.add(DragValue::new(&mut value[0]).range(0..=max));
                ui.label("y");
                ui.add(DragValue::new(&mut value[1]).range(0..=max));
            });
        }
        DimensionChoice::Tags(_) | DimensionChoice::Components(_) => {
            let count = choice.count().unwrap_or(0);
            for (axis, name) in ["x", "y"].into_iter().enumerate() {
                ui.horizontal(|ui| {
                    ui.label(name);
                    ComboBox::from_id_salt((form_id, "dimension", axis))
                        .selected_text(choice.label(value[axis]))
                        .show_ui(ui, |ui| {
                            for dim in 0..count {
                                ui.selectable_value(&mut value[axis], dim, choice.label(dim));
                            }
                        });
                });
            }
        }
    }
    if *dims != Some(value) {
        *dims = Some(value);
    }
}
