//! Scatter panel on top of `egui_plot`.
//!
//! A panel owns one figure at a time. `render` swaps the figure wholesale and
//! resets every piece of interaction state; `show` plots it into whatever
//! space the layout hands out and reports what the user did.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use egui::{Align2, Color32, Pos2};
use egui_plot::{Legend, Line, Plot, PlotPoint, Points, Text};

use crate::coupling::{OpacityUpdate, PanelCommand};
use crate::model::{EntityId, Figure, PointRef, Side, Title};

const POINT_RADIUS: f32 = 3.5;
const HOVER_RADIUS: f32 = 8.0;
const LASSO_MIN_STEP: f32 = 2.0;
const MIRROR_COLOR: Color32 = Color32::from_rgb(0xff, 0xa5, 0x00);

// plotly's default colorway, so figures look the way the backend intends
const PALETTE: [Color32; 10] = [
    Color32::from_rgb(0x1f, 0x77, 0xb4),
    Color32::from_rgb(0xff, 0x7f, 0x0e),
    Color32::from_rgb(0x2c, 0xa0, 0x2c),
    Color32::from_rgb(0xd6, 0x27, 0x28),
    Color32::from_rgb(0x94, 0x67, 0xbd),
    Color32::from_rgb(0x8c, 0x56, 0x4b),
    Color32::from_rgb(0xe3, 0x77, 0xc2),
    Color32::from_rgb(0x7f, 0x7f, 0x7f),
    Color32::from_rgb(0xbc, 0xbd, 0x22),
    Color32::from_rgb(0x17, 0xbe, 0xcf),
];

/// A point under the pointer, with the entity it stands for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointHit {
    pub point: PointRef,
    pub entity: Option<EntityId>,
}

/// Selected point indices, grouped by series
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    curves: BTreeMap<usize, Vec<usize>>,
}

impl Selection {
    pub fn from_points<I: IntoIterator<Item = PointRef>>(points: I) -> Self {
        let mut grouped: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for p in points {
            grouped.entry(p.curve).or_default().insert(p.point);
        }
        Self { curves: grouped.into_iter().map(|(curve, points)| (curve, points.into_iter().collect())).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.curves.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.curves.values().map(Vec::len).sum()
    }

    pub fn points(&self, curve: usize) -> &[usize] {
        self.curves.get(&curve).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, point: PointRef) -> bool {
        self.points(point.curve).binary_search(&point.point).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = PointRef> + '_ {
        self.curves.iter().flat_map(|(&curve, points)| points.iter().map(move |&p| PointRef::new(curve, p)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PanelEvent {
    Hover { points: Vec<PointHit> },
    Unhover,
    Click { points: Vec<PointHit> },
    Selected(Selection),
    Deselect,
}

/// Points sharing one marker style, handed to the plot as a single item
#[derive(Clone, Debug, PartialEq)]
pub struct PointGroup {
    pub name: String,
    pub color: Color32,
    pub radius: f32,
    pub filled: bool,
    pub points: Vec<[f64; 2]>,
}

/// Even-odd ray cast
pub fn point_in_polygon(point: [f64; 2], polygon: &[[f64; 2]]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let [px, py] = point;
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let [xi, yi] = polygon[i];
        let [xj, yj] = polygon[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Points of `figure` falling inside the polygon, polygon in data coordinates
pub fn lasso_select(figure: &Figure, polygon: &[[f64; 2]]) -> Selection {
    let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for &[x, y] in polygon {
        min = [min[0].min(x), min[1].min(y)];
        max = [max[0].max(x), max[1].max(y)];
    }
    let mut selected = Vec::new();
    for (curve, trace) in figure.data.iter().enumerate() {
        for (point, (&x, &y)) in trace.x.iter().zip(&trace.y).enumerate() {
            // bounding box first, the polygon test is the expensive part
            if x < min[0] || x > max[0] || y < min[1] || y > max[1] {
                continue;
            }
            if point_in_polygon([x, y], polygon) {
                selected.push(PointRef::new(curve, point));
            }
        }
    }
    Selection::from_points(selected)
}

pub struct PlotPanel {
    side: Side,
    figure: Option<Figure>,
    generation: u64,
    hovered: Option<PointRef>,
    mirrored: Vec<PointRef>,
    selection: Selection,
    opacity: OpacityUpdate,
    highlight: HashSet<EntityId>,
    // plot coordinates
    lasso: Vec<[f64; 2]>,
    dimmed: f32,
}

impl PlotPanel {
    pub fn new(side: Side, dimmed: f32) -> Self {
        Self {
            side,
            figure: None,
            generation: 0,
            hovered: None,
            mirrored: Vec::new(),
            selection: Selection::default(),
            opacity: OpacityUpdate::Uniform(1.0),
            highlight: HashSet::new(),
            lasso: Vec::new(),
            dimmed,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn figure(&self) -> Option<&Figure> {
        self.figure.as_ref()
    }

    /// Bumped on every render; bindings made for an older generation are stale
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shape(&self) -> Vec<usize> {
        self.figure.as_ref().map(Figure::shape).unwrap_or_default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn mirrored(&self) -> &[PointRef] {
        &self.mirrored
    }

    pub fn opacity(&self) -> &OpacityUpdate {
        &self.opacity
    }

    pub fn dragmode(&self) -> Option<&str> {
        self.figure.as_ref()?.layout.dragmode.as_deref()
    }

    /// Replace the figure. Everything tied to the previous one is dropped.
    pub fn render(&mut self, mut figure: Figure) {
        figure.layout.dragmode = Some("lasso".to_string());
        tracing::debug!(
            panel = self.side.plot_id(),
            series = figure.data.len(),
            points = figure.point_count(),
            "rendering figure"
        );
        self.figure = Some(figure);
        self.generation += 1;
        self.hovered = None;
        self.mirrored.clear();
        self.selection = Selection::default();
        self.opacity = OpacityUpdate::Uniform(1.0);
        self.lasso.clear();
    }

    pub fn set_highlight<I: IntoIterator<Item = EntityId>>(&mut self, ids: I) {
        self.highlight = ids.into_iter().collect();
    }

    pub fn apply(&mut self, command: PanelCommand) {
        match command {
            PanelCommand::Hover(points) => {
                let figure = self.figure.as_ref();
                self.mirrored = points
                    .into_iter()
                    .filter(|p| figure.is_some_and(|f| f.data.get(p.curve).is_some_and(|t| p.point < t.len())))
                    .collect();
            }
            PanelCommand::Unhover => self.mirrored.clear(),
            PanelCommand::Restyle(update) => self.opacity = update,
        }
    }

    /// Ids of the selected points, or of every point when nothing is selected
    pub fn entities(&self) -> Vec<EntityId> {
        let Some(figure) = &self.figure else {
            return Vec::new();
        };
        if self.selection.is_empty() {
            return figure.data.iter().flat_map(|t| t.ids.iter().cloned()).collect();
        }
        self.selection.iter().filter_map(|p| figure.entity(p).cloned()).collect()
    }

    fn hit(&self, point: PointRef) -> PointHit {
        let entity = self.figure.as_ref().and_then(|f| f.entity(point)).cloned();
        PointHit { point, entity }
    }

    /// Nearest point within the hover radius of `pos`, `to_screen` maps plot
    /// coordinates onto the screen
    pub fn hit_test(&self, pos: Pos2, to_screen: impl Fn([f64; 2]) -> Pos2) -> Option<PointHit> {
        let figure = self.figure.as_ref()?;
        let mut best: Option<(f32, PointRef)> = None;
        for (curve, trace) in figure.data.iter().enumerate() {
            for (point, (&x, &y)) in trace.x.iter().zip(&trace.y).enumerate() {
                let d = to_screen([x, y]).distance(pos);
                if d <= HOVER_RADIUS && best.is_none_or(|(bd, _)| d < bd) {
                    best = Some((d, PointRef::new(curve, point)));
                }
            }
        }
        best.map(|(_, p)| self.hit(p))
    }

    /// Hover state transition; only changes produce events
    pub fn hover_to(&mut self, hit: Option<PointHit>) -> Option<PanelEvent> {
        match hit {
            Some(hit) if self.hovered == Some(hit.point) => None,
            Some(hit) => {
                self.hovered = Some(hit.point);
                Some(PanelEvent::Hover { points: vec![hit] })
            }
            None if self.hovered.take().is_some() => Some(PanelEvent::Unhover),
            None => None,
        }
    }

    /// Lasso in data coordinates
    pub fn select_polygon(&mut self, polygon: &[[f64; 2]]) -> PanelEvent {
        let Some(figure) = &self.figure else {
            return PanelEvent::Deselect;
        };
        self.selection = lasso_select(figure, polygon);
        tracing::debug!(panel = self.side.plot_id(), selected = self.selection.len(), "lasso selection");
        PanelEvent::Selected(self.selection.clone())
    }

    pub fn deselect(&mut self) -> PanelEvent {
        self.selection = Selection::default();
        PanelEvent::Deselect
    }

    fn point_opacity(&self, point: PointRef) -> f32 {
        if !self.selection.is_empty() {
            return if self.selection.contains(point) { 1.0 } else { self.dimmed };
        }
        match &self.opacity {
            OpacityUpdate::Uniform(value) => *value,
            OpacityUpdate::PerPoint(masks) => {
                masks.get(point.curve).and_then(|m| m.get(point.point)).copied().unwrap_or(1.0)
            }
        }
    }

    fn position(&self, point: PointRef) -> Option<[f64; 2]> {
        let trace = self.figure.as_ref()?.data.get(point.curve)?;
        Some([*trace.x.get(point.point)?, *trace.y.get(point.point)?])
    }

    /// Marker groups for the current figure: one per series, opacity and
    /// highlight combination, then the hover and mirror rings on top
    pub fn point_groups(&self, ring_color: Color32) -> Vec<PointGroup> {
        let Some(figure) = &self.figure else {
            return Vec::new();
        };
        let mut groups = Vec::new();
        for (curve, trace) in figure.data.iter().enumerate() {
            let color = PALETTE[curve % PALETTE.len()];
            let name = trace.name.clone().unwrap_or_default();
            let mut buckets: BTreeMap<(u8, bool), Vec<[f64; 2]>> = BTreeMap::new();
            for (point, (&x, &y)) in trace.x.iter().zip(&trace.y).enumerate() {
                let alpha = (self.point_opacity(PointRef::new(curve, point)).clamp(0.0, 1.0) * 255.0).round() as u8;
                let highlighted = trace.ids.get(point).is_some_and(|id| self.highlight.contains(id));
                buckets.entry((alpha, highlighted)).or_default().push([x, y]);
            }
            for ((alpha, highlighted), points) in buckets {
                let fill = color.gamma_multiply(f32::from(alpha) / 255.0);
                let radius = if highlighted { POINT_RADIUS * 1.8 } else { POINT_RADIUS };
                if highlighted {
                    groups.push(PointGroup { name: String::new(), color: ring_color, radius, filled: false, points: points.clone() });
                }
                groups.push(PointGroup { name: name.clone(), color: fill, radius, filled: true, points });
            }
        }

        let mirrored: Vec<[f64; 2]> = self.mirrored.iter().filter_map(|&p| self.position(p)).collect();
        if !mirrored.is_empty() {
            groups.push(PointGroup { name: String::new(), color: MIRROR_COLOR, radius: HOVER_RADIUS, filled: false, points: mirrored });
        }
        if let Some(hovered) = self.hovered.and_then(|p| self.position(p)) {
            groups.push(PointGroup { name: String::new(), color: ring_color, radius: HOVER_RADIUS, filled: false, points: vec![hovered] });
        }
        groups
    }

    fn hover_label(&self) -> Option<([f64; 2], String)> {
        let point = self.hovered?;
        let trace = self.figure.as_ref()?.data.get(point.curve)?;
        let label = trace.hovertext.get(point.point).or(trace.ids.get(point.point)).cloned()?;
        Some((self.position(point)?, label))
    }

    pub fn show(&mut self, ui: &mut egui::Ui) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        let Some(figure) = &self.figure else {
            ui.centered_and_justified(|ui| ui.label("No plot loaded"));
            return events;
        };
        if let Some(title) = figure.layout.title.as_ref().map(Title::text) {
            ui.vertical_centered(|ui| ui.strong(title));
        }

        let mut plot = Plot::new((self.side.plot_id(), self.generation))
            .allow_drag(false)
            .allow_boxed_zoom(false)
            .show_x(false)
            .show_y(false)
            .legend(Legend::default());
        if let Some(x_title) = figure.layout.x_title() {
            plot = plot.x_axis_label(x_title.to_string());
        }
        if let Some(y_title) = figure.layout.y_title() {
            plot = plot.y_axis_label(y_title.to_string());
        }

        let text_color = ui.visuals().text_color();
        let lines: Vec<(String, Vec<[f64; 2]>, Color32)> = figure
            .data
            .iter()
            .enumerate()
            .filter(|(_, trace)| trace.draws_lines() && trace.len() > 1)
            .map(|(curve, trace)| {
                let points = trace.x.iter().zip(&trace.y).map(|(&x, &y)| [x, y]).collect();
                (String::new(), points, PALETTE[curve % PALETTE.len()].gamma_multiply(0.6))
            })
            .collect();
        let groups = self.point_groups(text_color);
        let label = self.hover_label();
        let mut lasso = self.lasso.clone();
        if let Some(&first) = lasso.first() {
            lasso.push(first);
        }

        let plot_response = plot.show(ui, |plot_ui| {
            for (name, points, color) in lines {
                plot_ui.line(Line::new(name, points).color(color));
            }
            for group in groups {
                plot_ui.points(
                    Points::new(group.name, group.points).color(group.color).radius(group.radius).filled(group.filled),
                );
            }
            if let Some(([x, y], text)) = label {
                plot_ui.text(Text::new("", PlotPoint::new(x, y), text).anchor(Align2::LEFT_BOTTOM).color(text_color));
            }
            if lasso.len() > 1 {
                plot_ui.line(Line::new("", lasso).color(text_color));
            }
        });

        let response = &plot_response.response;
        let transform = &plot_response.transform;
        let to_screen = |[x, y]: [f64; 2]| transform.position_from_point(&PlotPoint::new(x, y));

        // lasso
        if response.drag_started() {
            self.lasso.clear();
        }
        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                if self.lasso.last().is_none_or(|&last| to_screen(last).distance(pos) >= LASSO_MIN_STEP) {
                    let value = transform.value_from_position(pos);
                    self.lasso.push([value.x, value.y]);
                }
            }
        }
        if response.drag_stopped() {
            let polygon = std::mem::take(&mut self.lasso);
            let event = if polygon.len() < 3 { self.deselect() } else { self.select_polygon(&polygon) };
            events.push(event);
        }

        if response.double_clicked() {
            events.push(self.deselect());
        }

        // hover, suspended while lassoing
        let hit = if response.dragged() { None } else { response.hover_pos().and_then(|pos| self.hit_test(pos, to_screen)) };
        if response.clicked() {
            if let Some(hit) = hit.clone() {
                events.push(PanelEvent::Click { points: vec![hit] });
            }
        }
        if let Some(event) = self.hover_to(hit) {
            events.push(event);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Trace;

    fn figure() -> Figure {
        Figure {
            data: vec![
                Trace {
                    x: vec![0.0, 1.0, 2.0, 3.0],
                    y: vec![0.0, 1.0, 2.0, 3.0],
                    ids: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    ..Trace::default()
                },
                Trace { x: vec![10.0], y: vec![10.0], ids: vec!["z".into()], ..Trace::default() },
            ],
            ..Figure::default()
        }
    }

    // 10 px per unit, y pointing up
    fn to_screen([x, y]: [f64; 2]) -> Pos2 {
        Pos2::new((x * 10.0) as f32, (200.0 - y * 10.0) as f32)
    }

    #[test]
    fn point_in_square() {
        let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(point_in_polygon([0.5, 0.5], &square));
        assert!(!point_in_polygon([1.5, 0.5], &square));
        assert!(!point_in_polygon([0.5, 0.5], &square[..2]));
    }

    #[test]
    fn lasso_picks_points_inside() {
        let polygon = [[0.5, 0.5], [2.5, 0.5], [2.5, 2.5], [0.5, 2.5]];
        let selection = lasso_select(&figure(), &polygon);
        assert_eq!(selection.iter().collect::<Vec<_>>(), vec![PointRef::new(0, 1), PointRef::new(0, 2)]);
        assert_eq!(selection.points(1), &[] as &[usize]);
    }

    #[test]
    fn render_forces_lasso_and_resets_state() {
        let mut panel = PlotPanel::new(Side::Left, 0.2);
        panel.render(figure());
        panel.select_polygon(&[[-1.0, -1.0], [1.5, -1.0], [1.5, 1.5], [-1.0, 1.5]]);
        panel.apply(PanelCommand::Hover(vec![PointRef::new(0, 1)]));
        panel.apply(PanelCommand::Restyle(OpacityUpdate::Uniform(0.2)));
        assert_eq!(panel.selection().len(), 2);

        panel.render(figure());
        assert_eq!(panel.generation(), 2);
        assert_eq!(panel.dragmode(), Some("lasso"));
        assert!(panel.selection().is_empty());
        assert!(panel.mirrored().is_empty());
        assert_eq!(panel.opacity(), &OpacityUpdate::Uniform(1.0));
    }

    #[test]
    fn mirrored_hover_ignores_points_outside_figure() {
        let mut panel = PlotPanel::new(Side::Right, 0.2);
        panel.render(figure());
        panel.apply(PanelCommand::Hover(vec![PointRef::new(0, 3), PointRef::new(1, 5), PointRef::new(4, 0)]));
        assert_eq!(panel.mirrored(), &[PointRef::new(0, 3)]);
        panel.apply(PanelCommand::Unhover);
        assert!(panel.mirrored().is_empty());
    }

    #[test]
    fn hit_test_finds_nearest_point() {
        let mut panel = PlotPanel::new(Side::Left, 0.2);
        assert!(panel.hit_test(Pos2::ZERO, to_screen).is_none());
        panel.render(figure());
        let pos = to_screen([1.0, 1.0]) + egui::Vec2::new(2.0, 1.0);
        let hit = panel.hit_test(pos, to_screen).unwrap();
        assert_eq!(hit.point, PointRef::new(0, 1));
        assert_eq!(hit.entity.as_deref(), Some("b"));
        assert!(panel.hit_test(Pos2::new(199.0, 1.0), to_screen).is_none());
    }

    #[test]
    fn hover_events_only_on_change() {
        let mut panel = PlotPanel::new(Side::Left, 0.2);
        panel.render(figure());
        let hit = PointHit { point: PointRef::new(0, 2), entity: Some("c".into()) };
        assert!(matches!(panel.hover_to(Some(hit.clone())), Some(PanelEvent::Hover { .. })));
        assert_eq!(panel.hover_to(Some(hit)), None);
        assert_eq!(panel.hover_to(None), Some(PanelEvent::Unhover));
        assert_eq!(panel.hover_to(None), None);
    }

    #[test]
    fn entities_follow_selection() {
        let mut panel = PlotPanel::new(Side::Left, 0.2);
        assert!(panel.entities().is_empty());
        panel.render(figure());
        assert_eq!(panel.entities(), vec!["a", "b", "c", "d", "z"]);
        panel.select_polygon(&[[9.0, 9.0], [11.0, 9.0], [11.0, 11.0], [9.0, 11.0]]);
        assert_eq!(panel.entities(), vec!["z"]);
        assert_eq!(panel.deselect(), PanelEvent::Deselect);
        assert_eq!(panel.entities().len(), 5);
    }

    #[test]
    fn selection_splits_series_by_opacity() {
        let mut panel = PlotPanel::new(Side::Left, 0.2);
        panel.render(figure());
        panel.select_polygon(&[[0.5, 0.5], [2.5, 0.5], [2.5, 2.5], [0.5, 2.5]]);

        let groups = panel.point_groups(Color32::WHITE);
        let first: Vec<&PointGroup> = groups.iter().filter(|g| g.filled && g.points.contains(&[0.0, 0.0])).collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].points, vec![[0.0, 0.0], [3.0, 3.0]]);
        assert_eq!(first[0].color, PALETTE[0].gamma_multiply(51.0 / 255.0));
        let bright = groups.iter().find(|g| g.points == vec![[1.0, 1.0], [2.0, 2.0]]).unwrap();
        assert_eq!(bright.color, PALETTE[0]);
        assert_eq!(groups.iter().filter(|g| g.filled).map(|g| g.points.len()).sum::<usize>(), 5);
    }

    #[test]
    fn restyle_and_rings_become_groups() {
        let mut panel = PlotPanel::new(Side::Right, 0.2);
        assert!(panel.point_groups(Color32::WHITE).is_empty());
        panel.render(figure());
        panel.apply(PanelCommand::Restyle(OpacityUpdate::PerPoint(vec![vec![1.0, 0.2, 0.2, 1.0], vec![0.2]])));
        panel.apply(PanelCommand::Hover(vec![PointRef::new(1, 0)]));
        panel.set_highlight(["a".to_string()]);

        let groups = panel.point_groups(Color32::WHITE);
        let mirror = groups.iter().find(|g| g.color == MIRROR_COLOR).unwrap();
        assert_eq!(mirror.points, vec![[10.0, 10.0]]);
        assert!(!mirror.filled);
        let highlighted: Vec<&PointGroup> = groups.iter().filter(|g| g.radius > POINT_RADIUS && g.radius < HOVER_RADIUS).collect();
        assert_eq!(highlighted.len(), 2);
        assert!(highlighted.iter().all(|g| g.points == vec![[0.0, 0.0]]));
        let dimmed = groups.iter().find(|g| g.filled && g.points == vec![[1.0, 1.0], [2.0, 2.0]]).unwrap();
        assert_eq!(dimmed.color, PALETTE[0].gamma_multiply(51.0 / 255.0));
    }
}
