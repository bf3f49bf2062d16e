//! Applies validated actions to a canvas surface.

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bounds::{Point, Rect, SafeBounds};
use crate::coords::CoordinateSystem;
use crate::cursor::{CursorActivity, CursorController};
use crate::curves::{CurveSpec, CustomCurveSpec, DEFAULT_SAMPLES, generate_curve_segments, generate_custom_curve};
use crate::protocol::{ActionKind, TextParams, WhiteboardAction};
use crate::surface::{CanvasElement, CanvasSurface, ExportedImage, TextStyle};
use crate::symbols::MathSymbol;
use crate::validate::{DEFAULT_SYMBOL_SIZE, ValidatedAction};

pub const DEFAULT_COLOR: &str = "#1f2937";
pub const DEFAULT_HIGHLIGHT: &str = "rgba(250, 204, 21, 0.35)";
const GRID_COLOR: &str = "#e5e7eb";
const DEFAULT_STROKE_WIDTH: f64 = 2.0;
const DEFAULT_FONT_SIZE: f64 = 24.0;
const EQUATION_FONT_SIZE: f64 = 28.0;
const LABEL_FONT_SIZE: f64 = 12.0;

/// What happened when an action was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub content: String,
    pub is_error: bool,
    pub elements_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ExportedImage>,
}

impl ActionOutcome {
    fn ok(kind: ActionKind, elements_added: usize, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            is_error: false,
            elements_added,
            image: None,
        }
    }

    fn error(kind: ActionKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            is_error: true,
            elements_added: 0,
            image: None,
        }
    }
}

/// The only writer of canvas state.
pub struct CanvasExecutor<S> {
    surface: S,
    cursor: CursorController,
    bounds: SafeBounds,
}

impl<S: CanvasSurface> CanvasExecutor<S> {
    pub fn new(surface: S, bounds: SafeBounds) -> Self {
        Self {
            surface,
            cursor: CursorController::new(bounds),
            bounds,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn cursor(&self) -> &CursorController {
        &self.cursor
    }

    pub fn bounds(&self) -> &SafeBounds {
        &self.bounds
    }

    /// Reflect a session activity change on the cursor.
    pub fn set_activity(&mut self, activity: CursorActivity) {
        self.cursor.set_activity(activity);
    }

    pub fn apply(&mut self, action: ValidatedAction) -> ActionOutcome {
        let kind = action.kind();
        debug!(%kind, "Applying action");

        match action.into_inner() {
            WhiteboardAction::MoveCursor(p) => {
                self.cursor.move_to(Point::new(p.x, p.y), CursorActivity::Pointing);
                ActionOutcome::ok(kind, 0, format!("Cursor at ({}, {})", p.x, p.y))
            }
            WhiteboardAction::DrawFreehand(p) => {
                let color = p.color.unwrap_or_else(|| DEFAULT_COLOR.into());
                let width = p.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH);
                let last = p.points.last().copied();
                let added = self.add_strokes(vec![p.points], &color, width);
                if let Some(last) = last {
                    self.cursor.move_to(last, CursorActivity::Drawing);
                }
                ActionOutcome::ok(kind, added, "Stroke drawn")
            }
            WhiteboardAction::DrawText(p) => self.add_text(kind, p, TextStyle::Plain, DEFAULT_FONT_SIZE),
            WhiteboardAction::DrawHandwriting(p) => {
                self.add_text(kind, p, TextStyle::Handwriting, EQUATION_FONT_SIZE)
            }
            WhiteboardAction::DrawEquation(p) => {
                let center = self.bounds.center();
                let text = TextParams {
                    text: p.latex,
                    x: p.x.unwrap_or(center.x),
                    y: p.y.unwrap_or(center.y),
                    font_size: p.font_size,
                    color: p.color,
                };
                self.add_text(kind, text, TextStyle::Latex, EQUATION_FONT_SIZE)
            }
            WhiteboardAction::DrawShape(p) => {
                let rect = self.bounds.clamp_rect_value(Rect {
                    x: p.x,
                    y: p.y,
                    width: p.width,
                    height: p.height,
                });
                self.surface.append(vec![CanvasElement::Shape {
                    id: new_id(),
                    shape: p.shape,
                    rect,
                    color: p.color.unwrap_or_else(|| DEFAULT_COLOR.into()),
                    filled: p.filled,
                }]);
                self.cursor.move_to(rect_center(&rect), CursorActivity::Drawing);
                ActionOutcome::ok(kind, 1, "Shape drawn")
            }
            WhiteboardAction::HighlightArea(p) => {
                let rect = self.bounds.clamp_rect_value(Rect {
                    x: p.x,
                    y: p.y,
                    width: p.width,
                    height: p.height,
                });
                self.surface.append(vec![CanvasElement::Highlight {
                    id: new_id(),
                    rect,
                    color: p.color.unwrap_or_else(|| DEFAULT_HIGHLIGHT.into()),
                }]);
                self.cursor.move_to(rect_center(&rect), CursorActivity::Pointing);
                ActionOutcome::ok(kind, 1, "Area highlighted")
            }
            WhiteboardAction::ClearWhiteboard => {
                self.surface.reset();
                self.cursor.reset();
                ActionOutcome::ok(kind, 0, "Whiteboard cleared")
            }
            WhiteboardAction::DrawMathCurve(p) => {
                let spec = CurveSpec {
                    function: p.function,
                    x_min: p.x_min,
                    x_max: p.x_max,
                    y_center: p.y_center,
                    amplitude: p.amplitude,
                    period: p.period,
                    coefficient: p.coefficient,
                    h_shift: p.h_shift.unwrap_or(0.0),
                    v_shift: p.v_shift.unwrap_or(0.0),
                    samples: p.samples.unwrap_or(DEFAULT_SAMPLES),
                };
                let segments = generate_curve_segments(&spec, &self.bounds);
                let color = p.color.unwrap_or_else(|| DEFAULT_COLOR.into());
                self.draw_segments(kind, segments, &color, p.function.as_str())
            }
            WhiteboardAction::DrawCustomCurve(p) => {
                let spec = CustomCurveSpec {
                    equation: p.equation.clone(),
                    x_min: p.x_min,
                    x_max: p.x_max,
                    canvas_x_min: p.canvas_x_min,
                    canvas_x_max: p.canvas_x_max,
                    y_center: p.y_center,
                    y_scale: p.y_scale,
                    samples: p.samples.unwrap_or(DEFAULT_SAMPLES),
                };
                match generate_custom_curve(&spec, &self.bounds) {
                    Ok(segments) => {
                        let color = p.color.unwrap_or_else(|| DEFAULT_COLOR.into());
                        self.draw_segments(kind, segments, &color, &p.equation)
                    }
                    Err(e) => {
                        warn!(equation = %p.equation, error = %e, "Custom curve rejected");
                        ActionOutcome::error(kind, format!("Could not plot '{}': {e}", p.equation))
                    }
                }
            }
            WhiteboardAction::DrawCoordinateSystem(spec) => {
                let system = CoordinateSystem::generate(&spec, &self.bounds);
                let added = self.add_coordinate_system(&system);
                self.cursor.move_to(system.to_pixel(0.0, 0.0), CursorActivity::Drawing);
                ActionOutcome::ok(kind, added, "Coordinate system drawn")
            }
            WhiteboardAction::DrawMathSymbol(p) => {
                let Some(symbol) = MathSymbol::parse(&p.symbol) else {
                    warn!(symbol = %p.symbol, "Unknown math symbol");
                    return ActionOutcome::error(kind, format!("Unknown symbol '{}'", p.symbol));
                };
                let origin = Point::new(p.x, p.y);
                let strokes = symbol.strokes(origin, p.size.unwrap_or(DEFAULT_SYMBOL_SIZE));
                let color = p.color.unwrap_or_else(|| DEFAULT_COLOR.into());
                let added = self.add_strokes(strokes, &color, DEFAULT_STROKE_WIDTH);
                self.cursor.move_to(origin, CursorActivity::Writing);
                ActionOutcome::ok(kind, added, format!("Drew {}", symbol.as_str()))
            }
            WhiteboardAction::CaptureScreenshot => match self.surface.export_image() {
                Some(image) => {
                    let mut outcome = ActionOutcome::ok(kind, 0, "Screenshot captured");
                    outcome.image = Some(image);
                    outcome
                }
                None => {
                    debug!("Surface cannot export, skipping screenshot");
                    ActionOutcome::ok(kind, 0, "Screenshot unavailable")
                }
            },
        }
    }

    fn add_text(&mut self, kind: ActionKind, p: TextParams, style: TextStyle, default_size: f64) -> ActionOutcome {
        let position = self.bounds.clamp(Point::new(p.x, p.y));
        self.surface.append(vec![CanvasElement::Text {
            id: new_id(),
            text: p.text,
            position,
            font_size: p.font_size.unwrap_or(default_size),
            color: p.color.unwrap_or_else(|| DEFAULT_COLOR.into()),
            style,
        }]);
        self.cursor.move_to(position, CursorActivity::Writing);
        ActionOutcome::ok(kind, 1, "Text written")
    }

    fn draw_segments(&mut self, kind: ActionKind, segments: Vec<Vec<Point>>, color: &str, label: &str) -> ActionOutcome {
        let last = segments.iter().rev().find_map(|s| s.last().copied());
        let added = self.add_strokes(segments, color, DEFAULT_STROKE_WIDTH);
        if let Some(last) = last {
            self.cursor.move_to(last, CursorActivity::Drawing);
        }
        ActionOutcome::ok(kind, added, format!("Plotted {label}"))
    }

    /// Append non-empty strokes, clamping every point once more.
    fn add_strokes(&mut self, strokes: Vec<Vec<Point>>, color: &str, width: f64) -> usize {
        let elements: Vec<CanvasElement> = strokes
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|points| CanvasElement::Stroke {
                id: new_id(),
                points: points.into_iter().map(|p| self.bounds.clamp(p)).collect(),
                color: color.to_string(),
                width,
            })
            .collect();
        let added = elements.len();
        self.surface.append(elements);
        added
    }

    fn add_coordinate_system(&mut self, system: &CoordinateSystem) -> usize {
        let grid = system.grid_lines.iter().map(|s| vec![s.from, s.to]).collect();
        let mut added = self.add_strokes(grid, GRID_COLOR, 1.0);

        let chrome = system
            .axes
            .iter()
            .chain(system.ticks.iter())
            .map(|s| vec![s.from, s.to])
            .chain(system.arrows.iter().cloned())
            .collect();
        added += self.add_strokes(chrome, DEFAULT_COLOR, DEFAULT_STROKE_WIDTH);

        let labels: Vec<CanvasElement> = system
            .labels
            .iter()
            .map(|label| CanvasElement::Text {
                id: new_id(),
                text: label.text.clone(),
                position: self.bounds.clamp(label.position),
                font_size: LABEL_FONT_SIZE,
                color: DEFAULT_COLOR.into(),
                style: TextStyle::Plain,
            })
            .collect();
        added += labels.len();
        self.surface.append(labels);
        added
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn rect_center(rect: &Rect) -> Point {
    Point::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CustomCurveParams, MoveCursorParams, ShapeKind, ShapeParams};
    use crate::session::CanvasSession;
    use crate::validate::validate;

    fn executor() -> CanvasExecutor<CanvasSession> {
        let bounds = SafeBounds::from_canvas(1000.0, 700.0, 40.0);
        CanvasExecutor::new(CanvasSession::new("test", 1000.0, 700.0), bounds)
    }

    fn run(exec: &mut CanvasExecutor<CanvasSession>, json: &str) -> ActionOutcome {
        let action: WhiteboardAction = serde_json::from_str(json).unwrap();
        let validated = validate(action, exec.bounds());
        exec.apply(validated)
    }

    #[test]
    fn test_append_only_until_clear() {
        let mut exec = executor();
        run(&mut exec, r#"{"type": "draw_text", "params": {"text": "a", "x": 100, "y": 100}}"#);
        run(&mut exec, r#"{"type": "draw_freehand", "params": {"points": [[50, 50], [60, 70]]}}"#);
        let first_id = exec.surface().elements()[0].id().to_string();
        assert_eq!(exec.surface().len(), 2);

        run(&mut exec, r#"{"type": "highlight_area", "params": {"x": 10, "y": 10, "width": 50, "height": 50}}"#);
        assert_eq!(exec.surface().len(), 3);
        assert_eq!(exec.surface().elements()[0].id(), first_id);

        let outcome = run(&mut exec, r#"{"type": "clear_whiteboard"}"#);
        assert!(!outcome.is_error);
        assert!(exec.surface().is_empty());
    }

    #[test]
    fn test_cursor_follows_actions() {
        let mut exec = executor();
        let validated = validate(
            WhiteboardAction::MoveCursor(MoveCursorParams { x: 5000.0, y: -20.0 }),
            exec.bounds(),
        );
        exec.apply(validated);
        assert_eq!(exec.cursor().position(), Point::new(860.0, 40.0));
        assert_eq!(exec.cursor().activity(), CursorActivity::Pointing);

        run(&mut exec, r#"{"type": "draw_text", "params": {"text": "b", "x": 200, "y": 300}}"#);
        assert_eq!(exec.cursor().position(), Point::new(200.0, 300.0));
        assert_eq!(exec.cursor().activity(), CursorActivity::Writing);
        assert_eq!(exec.surface().len(), 1);
    }

    #[test]
    fn test_curve_elements_stay_inside_bounds() {
        let mut exec = executor();
        let outcome = run(
            &mut exec,
            r#"{"type": "draw_math_curve", "params": {"function": "tan", "xMin": 0, "xMax": 2000, "yCenter": 350, "amplitude": 900}}"#,
        );
        assert!(outcome.elements_added >= 1);
        let bounds = *exec.bounds();
        for element in exec.surface().elements() {
            let CanvasElement::Stroke { points, .. } = element else {
                panic!("expected stroke");
            };
            assert!(points.iter().all(|p| bounds.contains(*p)));
        }
    }

    #[test]
    fn test_coordinate_system_adds_chrome_and_labels() {
        let mut exec = executor();
        let outcome = run(&mut exec, r#"{"type": "draw_coordinate_system", "params": {}}"#);
        // 2 axes + 20 ticks + 2 arrowheads + 20 labels.
        assert_eq!(outcome.elements_added, 44);
        assert_eq!(exec.surface().len(), 44);
    }

    #[test]
    fn test_bad_custom_equation_reports_error() {
        let mut exec = executor();
        let action = WhiteboardAction::DrawCustomCurve(CustomCurveParams {
            equation: "sin(".into(),
            x_min: -1.0,
            x_max: 1.0,
            canvas_x_min: 100.0,
            canvas_x_max: 900.0,
            y_center: 350.0,
            y_scale: 50.0,
            samples: None,
            color: None,
        });
        let validated = validate(action, exec.bounds());
        let outcome = exec.apply(validated);
        assert!(outcome.is_error);
        assert!(exec.surface().is_empty());
    }

    #[test]
    fn test_unknown_symbol_draws_nothing() {
        let mut exec = executor();
        let outcome = run(
            &mut exec,
            r#"{"type": "draw_math_symbol", "params": {"symbol": "aleph", "x": 100, "y": 100}}"#,
        );
        assert!(outcome.is_error);
        assert!(exec.surface().is_empty());

        let outcome = run(
            &mut exec,
            r#"{"type": "draw_math_symbol", "params": {"symbol": "infinity", "x": 100, "y": 100}}"#,
        );
        assert_eq!(outcome.elements_added, 1);
    }

    #[test]
    fn test_shape_element() {
        let mut exec = executor();
        let validated = validate(
            WhiteboardAction::DrawShape(ShapeParams {
                shape: ShapeKind::Triangle,
                x: 100.0,
                y: 100.0,
                width: 80.0,
                height: 60.0,
                color: None,
                filled: true,
            }),
            exec.bounds(),
        );
        exec.apply(validated);
        let CanvasElement::Shape { shape, rect, filled, .. } = &exec.surface().elements()[0] else {
            panic!("expected shape");
        };
        assert_eq!(*shape, ShapeKind::Triangle);
        assert_eq!(rect.width, 80.0);
        assert!(*filled);
        assert_eq!(exec.cursor().position(), Point::new(140.0, 130.0));
    }

    #[test]
    fn test_screenshot_with_and_without_export() {
        let mut exec = executor();
        let outcome = run(&mut exec, r#"{"type": "capture_screenshot"}"#);
        assert!(outcome.image.is_some());

        let bounds = SafeBounds::from_canvas(1000.0, 700.0, 40.0);
        let mut exec = CanvasExecutor::new(CanvasSession::new("x", 1000.0, 700.0).without_export(), bounds);
        let outcome = run(&mut exec, r#"{"type": "capture_screenshot"}"#);
        assert!(outcome.image.is_none());
        assert!(!outcome.is_error);
        assert!(exec.surface().is_empty());
    }
}
