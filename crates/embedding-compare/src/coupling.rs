//! Mirrors hover and lasso selection from one panel onto the other.
//!
//! Bindings are directional. The app binds left→right and right→left after
//! every render, tearing the old ones down first.

use crate::model::{PointRef, Side};
use crate::panel::{PanelEvent, Selection};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CouplingKind {
    Hover,
    Select,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InteractionBinding {
    pub source: Side,
    pub destination: Side,
    pub kind: CouplingKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OpacityUpdate {
    Uniform(f32),
    /// One opacity per point, one vector per series
    PerPoint(Vec<Vec<f32>>),
}

/// Programmatic action applied to a panel
#[derive(Clone, Debug, PartialEq)]
pub enum PanelCommand {
    Hover(Vec<PointRef>),
    Unhover,
    Restyle(OpacityUpdate),
}

/// Selected points at full opacity, the rest at `dimmed`. `None` when nothing
/// is selected, in which case callers reset to uniform full opacity.
pub fn opacity_mask(counts: &[usize], selection: &Selection, dimmed: f32) -> Option<Vec<Vec<f32>>> {
    if selection.is_empty() {
        return None;
    }
    let masks = counts
        .iter()
        .enumerate()
        .map(|(curve, &count)| {
            let mut mask = vec![dimmed; count];
            for &point in selection.points(curve) {
                if let Some(slot) = mask.get_mut(point) {
                    *slot = 1.0;
                }
            }
            mask
        })
        .collect();
    Some(masks)
}

#[derive(Debug)]
pub struct CouplingBinder {
    bindings: Vec<InteractionBinding>,
    dimmed: f32,
}

impl Default for CouplingBinder {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl CouplingBinder {
    pub fn new(dimmed: f32) -> Self {
        Self { bindings: Vec::new(), dimmed }
    }

    pub fn bindings(&self) -> &[InteractionBinding] {
        &self.bindings
    }

    fn bind(&mut self, kind: CouplingKind, source: Side, destination: Side, shapes: (&[usize], &[usize])) -> bool {
        if shapes.0 != shapes.1 {
            tracing::warn!(
                source = source.plot_id(),
                destination = destination.plot_id(),
                ?kind,
                source_series = shapes.0.len(),
                destination_series = shapes.1.len(),
                "panels are not comparable, skipping coupling"
            );
            return false;
        }
        let binding = InteractionBinding { source, destination, kind };
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
        true
    }

    /// Mirror hover from `source` onto `destination`. Skipped when the figures differ in shape.
    pub fn bind_hover(&mut self, source: Side, destination: Side, source_shape: &[usize], destination_shape: &[usize]) -> bool {
        self.bind(CouplingKind::Hover, source, destination, (source_shape, destination_shape))
    }

    pub fn bind_select(&mut self, source: Side, destination: Side, source_shape: &[usize], destination_shape: &[usize]) -> bool {
        self.bind(CouplingKind::Select, source, destination, (source_shape, destination_shape))
    }

    /// Drop every binding that touches `side`
    pub fn teardown(&mut self, side: Side) {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.source != side && b.destination != side);
        let removed = before - self.bindings.len();
        if removed > 0 {
            tracing::debug!(panel = side.plot_id(), removed, "removed coupling bindings");
        }
    }

    /// Commands to apply to other panels in response to an event on `source`
    pub fn dispatch(&self, source: Side, event: &PanelEvent, counts: &[usize]) -> Vec<(Side, PanelCommand)> {
        let mut commands = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.source == source) {
            let command = match (binding.kind, event) {
                (CouplingKind::Hover, PanelEvent::Hover { points }) => {
                    // one command per event, not one per hovered point
                    let refs: Vec<PointRef> = points.iter().map(|hit| hit.point).collect();
                    PanelCommand::Hover(refs)
                }
                (CouplingKind::Hover, PanelEvent::Unhover) => PanelCommand::Unhover,
                (CouplingKind::Select, PanelEvent::Selected(selection)) => {
                    match opacity_mask(counts, selection, self.dimmed) {
                        Some(masks) => PanelCommand::Restyle(OpacityUpdate::PerPoint(masks)),
                        None => PanelCommand::Restyle(OpacityUpdate::Uniform(1.0)),
                    }
                }
                (CouplingKind::Select, PanelEvent::Deselect) => PanelCommand::Restyle(OpacityUpdate::Uniform(1.0)),
                _ => continue,
            };
            commands.push((binding.destination, command));
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PointHit;

    fn coupled(shape: &[usize]) -> CouplingBinder {
        let mut binder = CouplingBinder::new(0.2);
        for side in Side::BOTH {
            assert!(binder.bind_hover(side, side.other(), shape, shape));
            assert!(binder.bind_select(side, side.other(), shape, shape));
        }
        binder
    }

    #[test]
    fn mask_marks_selected_points() {
        let selection = Selection::from_points([PointRef::new(0, 2), PointRef::new(0, 5)]);
        let masks = opacity_mask(&[10], &selection, 0.2).unwrap();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].len(), 10);
        for (i, value) in masks[0].iter().enumerate() {
            let expected = if i == 2 || i == 5 { 1.0 } else { 0.2 };
            assert_eq!(*value, expected, "point {i}");
        }
    }

    #[test]
    fn empty_selection_resets_to_full_opacity() {
        let binder = coupled(&[10]);
        assert_eq!(opacity_mask(&[10], &Selection::default(), 0.2), None);
        let commands = binder.dispatch(Side::Left, &PanelEvent::Selected(Selection::default()), &[10]);
        assert_eq!(commands, vec![(Side::Right, PanelCommand::Restyle(OpacityUpdate::Uniform(1.0)))]);
    }

    #[test]
    fn selection_dims_other_panel() {
        let binder = coupled(&[3, 2]);
        let selection = Selection::from_points([PointRef::new(1, 0)]);
        let commands = binder.dispatch(Side::Right, &PanelEvent::Selected(selection), &[3, 2]);
        assert_eq!(
            commands,
            vec![(Side::Left, PanelCommand::Restyle(OpacityUpdate::PerPoint(vec![vec![0.2; 3], vec![1.0, 0.2]])))]
        );
        let commands = binder.dispatch(Side::Right, &PanelEvent::Deselect, &[3, 2]);
        assert_eq!(commands, vec![(Side::Left, PanelCommand::Restyle(OpacityUpdate::Uniform(1.0)))]);
    }

    #[test]
    fn hover_produces_exactly_one_destination_command() {
        let binder = coupled(&[4, 8]);
        let event = PanelEvent::Hover { points: vec![PointHit { point: PointRef::new(1, 3), entity: None }] };
        let commands = binder.dispatch(Side::Left, &event, &[4, 8]);
        assert_eq!(commands, vec![(Side::Right, PanelCommand::Hover(vec![PointRef::new(1, 3)]))]);

        let commands = binder.dispatch(Side::Left, &PanelEvent::Unhover, &[4, 8]);
        assert_eq!(commands, vec![(Side::Right, PanelCommand::Unhover)]);
    }

    #[test]
    fn binding_twice_does_not_duplicate_commands() {
        let mut binder = coupled(&[2]);
        binder.bind_hover(Side::Left, Side::Right, &[2], &[2]);
        assert_eq!(binder.bindings().len(), 4);
        let commands = binder.dispatch(Side::Left, &PanelEvent::Unhover, &[2]);
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn incomparable_panels_are_not_coupled() {
        let mut binder = CouplingBinder::default();
        assert!(!binder.bind_hover(Side::Left, Side::Right, &[10], &[9]));
        assert!(!binder.bind_select(Side::Left, Side::Right, &[10], &[5, 5]));
        assert!(binder.bindings().is_empty());
        assert!(binder.dispatch(Side::Left, &PanelEvent::Unhover, &[10]).is_empty());
    }

    #[test]
    fn teardown_removes_both_directions() {
        let mut binder = coupled(&[1]);
        binder.teardown(Side::Left);
        assert!(binder.bindings().is_empty());
        assert!(binder.dispatch(Side::Right, &PanelEvent::Unhover, &[1]).is_empty());
    }

    #[test]
    fn clicks_are_not_coupled() {
        let binder = coupled(&[1]);
        let event = PanelEvent::Click { points: vec![PointHit { point: PointRef::new(0, 0), entity: None }] };
        assert!(binder.dispatch(Side::Left, &event, &[1]).is_empty());
    }
}
