//! Whiteboard action wire types.
//!
//! Every action travels as `{"type": "<kind>", "params": {...}}` with
//! camelCase parameter names. Decoding dispatches on the kind first, so an
//! unknown kind is rejected before its parameters are looked at.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bounds::Point;
use crate::coords::CoordinateSystemSpec;
use crate::curves::{CurveFunction, MAX_SAMPLES};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown action kind: {0}")]
    UnknownKind(String),

    #[error("invalid params for {kind}: {source}")]
    InvalidParams {
        kind: ActionKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed action JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Discriminant of [`WhiteboardAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MoveCursor,
    DrawFreehand,
    DrawText,
    DrawShape,
    DrawEquation,
    HighlightArea,
    ClearWhiteboard,
    DrawMathCurve,
    DrawCustomCurve,
    DrawCoordinateSystem,
    DrawMathSymbol,
    DrawHandwriting,
    CaptureScreenshot,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        Self::MoveCursor,
        Self::DrawFreehand,
        Self::DrawText,
        Self::DrawShape,
        Self::DrawEquation,
        Self::HighlightArea,
        Self::ClearWhiteboard,
        Self::DrawMathCurve,
        Self::DrawCustomCurve,
        Self::DrawCoordinateSystem,
        Self::DrawMathSymbol,
        Self::DrawHandwriting,
        Self::CaptureScreenshot,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveCursor => "move_cursor",
            Self::DrawFreehand => "draw_freehand",
            Self::DrawText => "draw_text",
            Self::DrawShape => "draw_shape",
            Self::DrawEquation => "draw_equation",
            Self::HighlightArea => "highlight_area",
            Self::ClearWhiteboard => "clear_whiteboard",
            Self::DrawMathCurve => "draw_math_curve",
            Self::DrawCustomCurve => "draw_custom_curve",
            Self::DrawCoordinateSystem => "draw_coordinate_system",
            Self::DrawMathSymbol => "draw_math_symbol",
            Self::DrawHandwriting => "draw_handwriting",
            Self::CaptureScreenshot => "capture_screenshot",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCursorParams {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreehandParams {
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
}

/// Shared by `draw_text` and `draw_handwriting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextParams {
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    #[default]
    #[serde(alias = "rect")]
    Rectangle,
    Circle,
    Ellipse,
    Line,
    Arrow,
    Triangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeParams {
    #[serde(default)]
    pub shape: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub filled: bool,
}

/// LaTeX source; position defaults to the middle of the board when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquationParams {
    pub latex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightParams {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathCurveParams {
    #[serde(default)]
    pub function: CurveFunction,
    pub x_min: f64,
    pub x_max: f64,
    pub y_center: f64,
    pub amplitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_shift: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_shift: Option<f64>,
    #[serde(default, deserialize_with = "sample_count", skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCurveParams {
    pub equation: String,
    pub x_min: f64,
    pub x_max: f64,
    pub canvas_x_min: f64,
    pub canvas_x_max: f64,
    pub y_center: f64,
    pub y_scale: f64,
    #[serde(default, deserialize_with = "sample_count", skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathSymbolParams {
    pub symbol: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One instruction for the shared canvas.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum WhiteboardAction {
    MoveCursor(MoveCursorParams),
    DrawFreehand(FreehandParams),
    DrawText(TextParams),
    DrawShape(ShapeParams),
    DrawEquation(EquationParams),
    HighlightArea(HighlightParams),
    ClearWhiteboard,
    DrawMathCurve(MathCurveParams),
    DrawCustomCurve(CustomCurveParams),
    DrawCoordinateSystem(CoordinateSystemSpec),
    DrawMathSymbol(MathSymbolParams),
    DrawHandwriting(TextParams),
    CaptureScreenshot,
}

impl WhiteboardAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::MoveCursor(_) => ActionKind::MoveCursor,
            Self::DrawFreehand(_) => ActionKind::DrawFreehand,
            Self::DrawText(_) => ActionKind::DrawText,
            Self::DrawShape(_) => ActionKind::DrawShape,
            Self::DrawEquation(_) => ActionKind::DrawEquation,
            Self::HighlightArea(_) => ActionKind::HighlightArea,
            Self::ClearWhiteboard => ActionKind::ClearWhiteboard,
            Self::DrawMathCurve(_) => ActionKind::DrawMathCurve,
            Self::DrawCustomCurve(_) => ActionKind::DrawCustomCurve,
            Self::DrawCoordinateSystem(_) => ActionKind::DrawCoordinateSystem,
            Self::DrawMathSymbol(_) => ActionKind::DrawMathSymbol,
            Self::DrawHandwriting(_) => ActionKind::DrawHandwriting,
            Self::CaptureScreenshot => ActionKind::CaptureScreenshot,
        }
    }

    /// Build an action from its kind name and untyped params.
    pub fn from_parts(kind: &str, params: Value) -> Result<Self, ProtocolError> {
        let kind = ActionKind::parse(kind).ok_or_else(|| ProtocolError::UnknownKind(kind.to_string()))?;
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let invalid = |source| ProtocolError::InvalidParams { kind, source };

        let action = match kind {
            ActionKind::MoveCursor => Self::MoveCursor(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::DrawFreehand => Self::DrawFreehand(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::DrawText => Self::DrawText(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::DrawShape => Self::DrawShape(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::DrawEquation => Self::DrawEquation(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::HighlightArea => Self::HighlightArea(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::ClearWhiteboard => Self::ClearWhiteboard,
            ActionKind::DrawMathCurve => Self::DrawMathCurve(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::DrawCustomCurve => {
                Self::DrawCustomCurve(serde_json::from_value(params).map_err(invalid)?)
            }
            ActionKind::DrawCoordinateSystem => {
                Self::DrawCoordinateSystem(serde_json::from_value(params).map_err(invalid)?)
            }
            ActionKind::DrawMathSymbol => Self::DrawMathSymbol(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::DrawHandwriting => Self::DrawHandwriting(serde_json::from_value(params).map_err(invalid)?),
            ActionKind::CaptureScreenshot => Self::CaptureScreenshot,
        };
        Ok(action)
    }

    /// Parse a function-call arguments string for the named action.
    pub fn from_call(name: &str, arguments: &str) -> Result<Self, ProtocolError> {
        let params: Value = if arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(arguments)?
        };
        Self::from_parts(name, params)
    }
}

/// Sample counts arrive as any JSON number; round and clamp them.
fn sample_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    let requested = Option::<f64>::deserialize(deserializer)?;
    Ok(requested
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(2.0, MAX_SAMPLES as f64) as usize))
}

/// Untyped envelope used for kind dispatch.
#[derive(Deserialize)]
struct WireAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: Value,
}

impl<'de> Deserialize<'de> for WhiteboardAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireAction::deserialize(deserializer)?;
        Self::from_parts(&wire.kind, wire.params).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
        assert_eq!(ActionKind::parse("draw_hologram"), None);
    }

    #[test]
    fn test_wire_shape() {
        let action = WhiteboardAction::DrawText(TextParams {
            text: "f(x)".into(),
            x: 100.0,
            y: 120.0,
            font_size: Some(24.0),
            color: None,
        });
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"type": "draw_text", "params": {"text": "f(x)", "x": 100.0, "y": 120.0, "fontSize": 24.0}})
        );
        assert_eq!(
            serde_json::to_value(WhiteboardAction::ClearWhiteboard).unwrap(),
            json!({"type": "clear_whiteboard"})
        );
    }

    #[test]
    fn test_camel_case_curve_params() {
        let action: WhiteboardAction = serde_json::from_value(json!({
            "type": "draw_math_curve",
            "params": {"function": "sin", "xMin": 40, "xMax": 960, "yCenter": 350, "amplitude": 100, "period": 200}
        }))
        .unwrap();
        let WhiteboardAction::DrawMathCurve(params) = action else {
            panic!("wrong variant");
        };
        assert_eq!(params.function, CurveFunction::Sin);
        assert_eq!(params.y_center, 350.0);
        assert_eq!(params.period, Some(200.0));
    }

    #[test]
    fn test_fractional_sample_counts() {
        let curve = |samples: Value| {
            let action = WhiteboardAction::from_parts(
                "draw_math_curve",
                json!({"function": "sin", "xMin": 0, "xMax": 10, "yCenter": 5, "amplitude": 1, "samples": samples}),
            )
            .unwrap();
            match action {
                WhiteboardAction::DrawMathCurve(params) => params.samples,
                other => panic!("wrong variant: {other:?}"),
            }
        };
        assert_eq!(curve(json!(100.0)), Some(100));
        assert_eq!(curve(json!(49.6)), Some(50));
        assert_eq!(curve(json!(-3)), Some(2));
        assert_eq!(curve(json!(1e12)), Some(MAX_SAMPLES));
        assert_eq!(curve(Value::Null), None);

        let action = WhiteboardAction::from_parts(
            "draw_custom_curve",
            json!({"equation": "x^2", "xMin": -2, "xMax": 2, "canvasXMin": 100, "canvasXMax": 500,
                   "yCenter": 300, "yScale": 20, "samples": 64.0}),
        )
        .unwrap();
        assert!(matches!(action, WhiteboardAction::DrawCustomCurve(CustomCurveParams { samples: Some(64), .. })));
    }

    #[test]
    fn test_unknown_curve_function_is_linear() {
        let action = WhiteboardAction::from_parts(
            "draw_math_curve",
            json!({"function": "zigzag", "xMin": 0, "xMax": 10, "yCenter": 5, "amplitude": 1}),
        )
        .unwrap();
        assert!(matches!(
            action,
            WhiteboardAction::DrawMathCurve(MathCurveParams { function: CurveFunction::Linear, .. })
        ));
    }

    #[test]
    fn test_unknown_kind_rejected_before_params() {
        let err = WhiteboardAction::from_parts("draw_hologram", json!({"x": 1})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(ref k) if k == "draw_hologram"));
    }

    #[test]
    fn test_invalid_params_reported_with_kind() {
        let err = WhiteboardAction::from_parts("move_cursor", json!({"x": "left"})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParams { kind: ActionKind::MoveCursor, .. }));
    }

    #[test]
    fn test_unit_kinds_ignore_params() {
        assert_eq!(
            WhiteboardAction::from_call("clear_whiteboard", "").unwrap(),
            WhiteboardAction::ClearWhiteboard
        );
        assert_eq!(
            WhiteboardAction::from_parts("capture_screenshot", json!({"anything": true})).unwrap(),
            WhiteboardAction::CaptureScreenshot
        );
    }

    #[test]
    fn test_from_call_malformed_json() {
        let err = WhiteboardAction::from_call("draw_equation", r#"{"latex": "#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_freehand_points_accept_pairs() {
        let action = WhiteboardAction::from_call(
            "draw_freehand",
            r#"{"points": [[10, 20], {"x": 30, "y": 40}], "strokeWidth": 3}"#,
        )
        .unwrap();
        let WhiteboardAction::DrawFreehand(params) = action else {
            panic!("wrong variant");
        };
        assert_eq!(params.points, vec![Point::new(10.0, 20.0), Point::new(30.0, 40.0)]);
        assert_eq!(params.stroke_width, Some(3.0));
    }

    #[test]
    fn test_coordinate_system_defaults_fill_missing_fields() {
        let action = WhiteboardAction::from_call(
            "draw_coordinate_system",
            r#"{"originX": 300, "originY": 300, "showGrid": true}"#,
        )
        .unwrap();
        let WhiteboardAction::DrawCoordinateSystem(spec) = action else {
            panic!("wrong variant");
        };
        assert_eq!(spec.origin_x, 300.0);
        assert!(spec.show_grid);
        assert_eq!(spec.x_step, CoordinateSystemSpec::default().x_step);
    }
}
