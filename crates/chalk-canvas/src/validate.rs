//! Type-specific clamping of decoded actions.
//!
//! [`validate`] is total: every action kind comes out with all of its
//! coordinates inside the safe bounds. The only way to obtain a
//! [`ValidatedAction`] is through this module, and the executor accepts
//! nothing else.

use serde::Serialize;

use crate::bounds::{Point, SafeBounds, clamp_finite};
use crate::curves::{DEFAULT_SAMPLES, MAX_SAMPLES};
use crate::protocol::{
    ActionKind, CustomCurveParams, EquationParams, FreehandParams, HighlightParams, MathCurveParams,
    MathSymbolParams, MoveCursorParams, ShapeParams, TextParams, WhiteboardAction,
};

/// Space kept free to the right of an anchored point.
pub const RESERVE_X: f64 = 100.0;
/// Space kept free below an anchored point.
pub const RESERVE_Y: f64 = 50.0;
/// Interior margin for a curve's centre line.
pub const CENTER_INSET: f64 = 50.0;
/// Gap kept between a curve's peak and the nearest edge.
pub const AMPLITUDE_GAP: f64 = 10.0;

pub const DEFAULT_SYMBOL_SIZE: f64 = 40.0;
const MIN_FONT_SIZE: f64 = 8.0;
const MAX_FONT_SIZE: f64 = 144.0;
const MIN_SYMBOL_SIZE: f64 = 8.0;
const MAX_STROKE_WIDTH: f64 = 40.0;

/// An action whose geometry has been clamped into [`SafeBounds`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedAction(WhiteboardAction);

impl ValidatedAction {
    pub fn action(&self) -> &WhiteboardAction {
        &self.0
    }

    pub fn kind(&self) -> ActionKind {
        self.0.kind()
    }

    pub fn into_inner(self) -> WhiteboardAction {
        self.0
    }
}

/// Clamp every coordinate of `action` into `bounds`.
pub fn validate(action: WhiteboardAction, bounds: &SafeBounds) -> ValidatedAction {
    let action = match action {
        WhiteboardAction::MoveCursor(p) => {
            let anchor = anchor(bounds, p.x, p.y);
            WhiteboardAction::MoveCursor(MoveCursorParams {
                x: anchor.x,
                y: anchor.y,
            })
        }
        WhiteboardAction::DrawFreehand(p) => WhiteboardAction::DrawFreehand(FreehandParams {
            points: p.points.into_iter().map(|pt| bounds.clamp(pt)).collect(),
            stroke_width: p.stroke_width.map(stroke_width),
            color: p.color,
        }),
        WhiteboardAction::DrawText(p) => WhiteboardAction::DrawText(text(p, bounds)),
        WhiteboardAction::DrawHandwriting(p) => WhiteboardAction::DrawHandwriting(text(p, bounds)),
        WhiteboardAction::DrawShape(p) => {
            let (x, y, width, height) = bounds.clamp_rect(p.x, p.y, p.width, p.height);
            WhiteboardAction::DrawShape(ShapeParams {
                x,
                y,
                width,
                height,
                ..p
            })
        }
        WhiteboardAction::HighlightArea(p) => {
            let (x, y, width, height) = bounds.clamp_rect(p.x, p.y, p.width, p.height);
            WhiteboardAction::HighlightArea(HighlightParams {
                x,
                y,
                width,
                height,
                color: p.color,
            })
        }
        WhiteboardAction::DrawEquation(p) => {
            let center = bounds.center();
            let anchor = anchor(bounds, p.x.unwrap_or(center.x), p.y.unwrap_or(center.y));
            WhiteboardAction::DrawEquation(EquationParams {
                x: Some(anchor.x),
                y: Some(anchor.y),
                font_size: p.font_size.map(font_size),
                ..p
            })
        }
        WhiteboardAction::DrawMathCurve(p) => WhiteboardAction::DrawMathCurve(math_curve(p, bounds)),
        WhiteboardAction::DrawCustomCurve(p) => WhiteboardAction::DrawCustomCurve(custom_curve(p, bounds)),
        WhiteboardAction::DrawCoordinateSystem(mut spec) => {
            spec.fit_within(bounds);
            WhiteboardAction::DrawCoordinateSystem(spec)
        }
        WhiteboardAction::DrawMathSymbol(p) => {
            let anchor = anchor(bounds, p.x, p.y);
            let room = (bounds.max_x - anchor.x).min(bounds.max_y - anchor.y);
            let size = p.size.unwrap_or(DEFAULT_SYMBOL_SIZE);
            let size = clamp_finite(size, MIN_SYMBOL_SIZE.min(room), room);
            WhiteboardAction::DrawMathSymbol(MathSymbolParams {
                x: anchor.x,
                y: anchor.y,
                size: Some(size),
                ..p
            })
        }
        action @ (WhiteboardAction::ClearWhiteboard | WhiteboardAction::CaptureScreenshot) => action,
    };
    ValidatedAction(action)
}

fn anchor(bounds: &SafeBounds, x: f64, y: f64) -> Point {
    bounds.clamp_with_reserve(Point::new(x, y), RESERVE_X, RESERVE_Y)
}

fn text(p: TextParams, bounds: &SafeBounds) -> TextParams {
    let anchor = anchor(bounds, p.x, p.y);
    TextParams {
        x: anchor.x,
        y: anchor.y,
        font_size: p.font_size.map(font_size),
        ..p
    }
}

fn font_size(size: f64) -> f64 {
    if size.is_finite() {
        size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    } else {
        MIN_FONT_SIZE
    }
}

fn stroke_width(width: f64) -> f64 {
    clamp_finite(width, 1.0, MAX_STROKE_WIDTH)
}

fn samples(requested: Option<usize>) -> Option<usize> {
    requested.map(|n| n.clamp(2, MAX_SAMPLES))
}

fn finite_or(value: Option<f64>, fallback: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() => Some(v),
        Some(_) => fallback,
        None => None,
    }
}

fn math_curve(p: MathCurveParams, bounds: &SafeBounds) -> MathCurveParams {
    let (x_min, x_max) = ordered(bounds.clamp_x(p.x_min), bounds.clamp_x(p.x_max));
    let y_center = bounds.clamp_center_y(p.y_center, CENTER_INSET);
    let headroom = (bounds.vertical_headroom(y_center) - AMPLITUDE_GAP).max(0.0);
    let requested = if p.amplitude.is_finite() { p.amplitude } else { 0.0 };
    let amplitude = requested.abs().min(headroom).copysign(requested);

    MathCurveParams {
        x_min,
        x_max,
        y_center,
        amplitude,
        period: finite_or(p.period, None).filter(|v| *v != 0.0),
        coefficient: finite_or(p.coefficient, None),
        h_shift: finite_or(p.h_shift, Some(0.0)),
        v_shift: finite_or(p.v_shift, Some(0.0)),
        samples: samples(p.samples),
        ..p
    }
}

/// Only the pixel side is clamped; the mathematical domain is left alone.
fn custom_curve(p: CustomCurveParams, bounds: &SafeBounds) -> CustomCurveParams {
    let (canvas_x_min, canvas_x_max) = ordered(bounds.clamp_x(p.canvas_x_min), bounds.clamp_x(p.canvas_x_max));
    CustomCurveParams {
        canvas_x_min,
        canvas_x_max,
        y_center: bounds.clamp_y(p.y_center),
        samples: samples(p.samples.or(Some(DEFAULT_SAMPLES))),
        ..p
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
