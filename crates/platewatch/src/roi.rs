//! Region-of-interest selection state.
//!
//! Pointer events arrive from the UI layer; the pipeline only reads the
//! committed rectangle. While a selection is being drawn, recognition is
//! suspended, so `is_selecting` doubles as the pipeline's skip signal.

use platewatch_types::{Point, Region};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum RoiState {
    #[default]
    Inactive,
    Selecting {
        anchor: Option<Point>,
        rect: Option<Region>,
    },
    Committed(Region),
}

#[derive(Debug, Default)]
pub struct RoiSelector {
    state: RoiState,
}

impl RoiSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters selection mode from any non-selecting state. Re-entering while
    /// already selecting restarts the drag.
    pub fn enable_selection(&mut self) {
        self.state = RoiState::Selecting {
            anchor: None,
            rect: None,
        };
    }

    pub fn pointer_down(&mut self, p: Point) {
        if let RoiState::Selecting { anchor, rect } = &mut self.state {
            *anchor = Some(p);
            *rect = Some(Region::from_corners(p, p));
        }
    }

    pub fn pointer_move(&mut self, p: Point) {
        if let RoiState::Selecting {
            anchor: Some(anchor),
            rect,
        } = &mut self.state
        {
            *rect = Some(Region::from_corners(*anchor, p));
        }
    }

    /// Finalizes the drag but stays in selection mode until an explicit save.
    pub fn pointer_up(&mut self, p: Point) {
        if let RoiState::Selecting { anchor, rect } = &mut self.state
            && let Some(origin) = anchor.take()
        {
            *rect = Some(Region::from_corners(origin, p));
        }
    }

    /// Commits the drawn rectangle. Returns it for event emission, or `None`
    /// when there is nothing usable to commit (no drag, or zero area).
    pub fn save(&mut self) -> Option<Region> {
        if let RoiState::Selecting { rect: Some(rect), .. } = self.state
            && !rect.is_empty()
        {
            self.state = RoiState::Committed(rect);
            return Some(rect);
        }
        None
    }

    /// Commits a rectangle directly, bypassing pointer input. Used for ROI
    /// presets in headless runs.
    pub fn commit(&mut self, rect: Region) {
        if !rect.is_empty() {
            self.state = RoiState::Committed(rect);
        }
    }

    /// Discards any selection or commitment.
    pub fn clear(&mut self) {
        self.state = RoiState::Inactive;
    }

    pub fn is_selecting(&self) -> bool {
        matches!(self.state, RoiState::Selecting { .. })
    }

    /// The in-progress rectangle, for rendering during a drag.
    pub fn selection_preview(&self) -> Option<Region> {
        match self.state {
            RoiState::Selecting { rect, .. } => rect,
            _ => None,
        }
    }

    pub fn committed(&self) -> Option<Region> {
        match self.state {
            RoiState::Committed(rect) => Some(rect),
            _ => None,
        }
    }

    /// The rectangle the pipeline should search: the committed ROI clamped to
    /// the frame, or the full frame when nothing is committed.
    pub fn effective(&self, frame_width: u32, frame_height: u32) -> Region {
        let full = Region::new(0, 0, frame_width, frame_height);
        match self.state {
            RoiState::Committed(rect) => rect.clamp_to(frame_width, frame_height).unwrap_or(full),
            _ => full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_normalizes_any_corner_order() {
        let mut roi = RoiSelector::new();
        roi.enable_selection();
        roi.pointer_down(Point::new(200, 150));
        roi.pointer_move(Point::new(50, 40));
        roi.pointer_up(Point::new(50, 40));
        assert!(roi.is_selecting(), "stays selecting until save");
        let saved = roi.save().unwrap();
        assert_eq!(saved, Region::new(50, 40, 150, 110));
    }

    #[test]
    fn pointer_events_outside_selection_mode_are_ignored() {
        let mut roi = RoiSelector::new();
        roi.pointer_down(Point::new(10, 10));
        roi.pointer_up(Point::new(90, 90));
        assert!(roi.save().is_none());
        assert_eq!(roi.effective(640, 360), Region::new(0, 0, 640, 360));
    }

    #[test]
    fn zero_area_drag_cannot_be_saved() {
        let mut roi = RoiSelector::new();
        roi.enable_selection();
        roi.pointer_down(Point::new(30, 30));
        roi.pointer_up(Point::new(30, 30));
        assert!(roi.save().is_none());
        assert!(roi.is_selecting());
    }

    #[test]
    fn clear_returns_to_full_frame() {
        let mut roi = RoiSelector::new();
        roi.enable_selection();
        roi.pointer_down(Point::new(0, 0));
        roi.pointer_up(Point::new(100, 50));
        roi.save().unwrap();
        assert_eq!(roi.effective(640, 360), Region::new(0, 0, 100, 50));
        roi.clear();
        assert_eq!(roi.effective(640, 360), Region::new(0, 0, 640, 360));
    }

    #[test]
    fn committed_roi_is_clamped_to_the_frame() {
        let mut roi = RoiSelector::new();
        roi.enable_selection();
        roi.pointer_down(Point::new(600, 300));
        roi.pointer_up(Point::new(900, 500));
        roi.save().unwrap();
        assert_eq!(roi.effective(640, 360), Region::new(600, 300, 40, 60));
    }

    #[test]
    fn negative_coordinates_clamp_to_zero() {
        let rect = Region::from_corners(Point::new(-20, -10), Point::new(40, 30));
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
    }
}
