//! Presentation state for the agent's on-board cursor.

use serde::{Deserialize, Serialize};

use crate::bounds::{Point, SafeBounds};

/// What the agent is doing, as shown to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorActivity {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Pointing,
    Drawing,
    Writing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorState {
    pub position: Point,
    pub activity: CursorActivity,
    pub visible: bool,
}

/// Mirrors the agent's focal point and activity.
#[derive(Debug, Clone)]
pub struct CursorController {
    bounds: SafeBounds,
    state: CursorState,
}

impl CursorController {
    pub fn new(bounds: SafeBounds) -> Self {
        Self {
            state: CursorState {
                position: bounds.center(),
                activity: CursorActivity::Idle,
                visible: false,
            },
            bounds,
        }
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn position(&self) -> Point {
        self.state.position
    }

    pub fn activity(&self) -> CursorActivity {
        self.state.activity
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    /// Move to `point` (clamped) and show the cursor.
    pub fn move_to(&mut self, point: Point, activity: CursorActivity) {
        self.state.position = self.bounds.clamp(point);
        self.state.activity = activity;
        self.state.visible = true;
    }

    /// Change activity without moving. `Idle` hides the cursor.
    pub fn set_activity(&mut self, activity: CursorActivity) {
        self.state.activity = activity;
        self.state.visible = activity != CursorActivity::Idle;
    }

    pub fn hide(&mut self) {
        self.state.visible = false;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_hidden_at_center() {
        let cursor = CursorController::new(SafeBounds::from_canvas(1000.0, 700.0, 40.0));
        assert_eq!(cursor.position(), Point::new(500.0, 350.0));
        assert_eq!(cursor.activity(), CursorActivity::Idle);
        assert!(!cursor.is_visible());
    }

    #[test]
    fn test_move_clamps_and_shows() {
        let mut cursor = CursorController::new(SafeBounds::from_canvas(1000.0, 700.0, 40.0));
        cursor.move_to(Point::new(-50.0, 2000.0), CursorActivity::Pointing);
        assert_eq!(cursor.position(), Point::new(40.0, 660.0));
        assert!(cursor.is_visible());
        assert_eq!(cursor.activity(), CursorActivity::Pointing);
    }

    #[test]
    fn test_idle_hides_and_reset_restores() {
        let mut cursor = CursorController::new(SafeBounds::from_canvas(1000.0, 700.0, 40.0));
        cursor.set_activity(CursorActivity::Speaking);
        assert!(cursor.is_visible());
        cursor.set_activity(CursorActivity::Idle);
        assert!(!cursor.is_visible());

        cursor.move_to(Point::new(100.0, 100.0), CursorActivity::Drawing);
        cursor.reset();
        assert_eq!(cursor.position(), Point::new(500.0, 350.0));
        assert!(!cursor.is_visible());
    }
}
