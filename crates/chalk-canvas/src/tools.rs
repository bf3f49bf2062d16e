//! Function schemas advertised to the remote model, one per action kind.

use serde::Serialize;
use serde_json::{Value, json};

use crate::protocol::ActionKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

impl ToolDefinition {
    /// Flat function shape used by realtime `session.update`.
    pub fn to_realtime(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema,
        })
    }
}

/// Definitions for every whiteboard action.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ActionKind::ALL
        .into_iter()
        .map(|kind| ToolDefinition {
            name: kind.as_str().to_string(),
            description: description(kind).to_string(),
            parameters_schema: schema(kind),
        })
        .collect()
}

pub fn realtime_tools() -> Vec<Value> {
    tool_definitions().iter().map(ToolDefinition::to_realtime).collect()
}

fn description(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::MoveCursor => "Move your pointer to a spot on the whiteboard to direct the student's attention.",
        ActionKind::DrawFreehand => "Draw a freehand stroke through a list of points.",
        ActionKind::DrawText => "Write plain text on the whiteboard.",
        ActionKind::DrawShape => "Draw a rectangle, circle, ellipse, line, arrow or triangle inside a bounding box.",
        ActionKind::DrawEquation => "Write a LaTeX equation on the whiteboard.",
        ActionKind::HighlightArea => "Highlight a rectangular area of the whiteboard.",
        ActionKind::ClearWhiteboard => "Erase everything on the whiteboard.",
        ActionKind::DrawMathCurve => "Plot a named function (sin, cos, tan, parabola, cubic, exponential, logarithm, absolute, sqrt, reciprocal, linear) across a pixel range.",
        ActionKind::DrawCustomCurve => "Plot an arbitrary equation in x over a mathematical domain mapped onto a pixel range.",
        ActionKind::DrawCoordinateSystem => "Draw labelled axes with ticks and an optional grid.",
        ActionKind::DrawMathSymbol => "Draw a math symbol: integral, derivative, partial, sum, product, sqrt or infinity.",
        ActionKind::DrawHandwriting => "Write text in a handwritten style.",
        ActionKind::CaptureScreenshot => "Look at the current whiteboard contents.",
    }
}

fn number(description: &str) -> Value {
    json!({"type": "number", "description": description})
}

fn string(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn schema(kind: ActionKind) -> Value {
    match kind {
        ActionKind::MoveCursor => object(
            json!({"x": number("Pixel x"), "y": number("Pixel y")}),
            &["x", "y"],
        ),
        ActionKind::DrawFreehand => object(
            json!({
                "points": {
                    "type": "array",
                    "description": "Points along the stroke",
                    "items": {
                        "type": "object",
                        "properties": {"x": {"type": "number"}, "y": {"type": "number"}},
                        "required": ["x", "y"]
                    }
                },
                "color": string("CSS color"),
                "strokeWidth": number("Line width in pixels"),
            }),
            &["points"],
        ),
        ActionKind::DrawText | ActionKind::DrawHandwriting => object(
            json!({
                "text": string("Text to write"),
                "x": number("Pixel x of the top-left corner"),
                "y": number("Pixel y of the top-left corner"),
                "fontSize": number("Font size in pixels"),
                "color": string("CSS color"),
            }),
            &["text", "x", "y"],
        ),
        ActionKind::DrawShape => object(
            json!({
                "shape": {
                    "type": "string",
                    "enum": ["rectangle", "circle", "ellipse", "line", "arrow", "triangle"]
                },
                "x": number("Left edge"),
                "y": number("Top edge"),
                "width": number("Width in pixels"),
                "height": number("Height in pixels"),
                "color": string("CSS color"),
                "filled": {"type": "boolean"},
            }),
            &["shape", "x", "y", "width", "height"],
        ),
        ActionKind::DrawEquation => object(
            json!({
                "latex": string("LaTeX source"),
                "x": number("Pixel x, defaults to the centre"),
                "y": number("Pixel y, defaults to the centre"),
                "fontSize": number("Font size in pixels"),
                "color": string("CSS color"),
            }),
            &["latex"],
        ),
        ActionKind::HighlightArea => object(
            json!({
                "x": number("Left edge"),
                "y": number("Top edge"),
                "width": number("Width in pixels"),
                "height": number("Height in pixels"),
                "color": string("CSS color"),
            }),
            &["x", "y", "width", "height"],
        ),
        ActionKind::DrawMathCurve => object(
            json!({
                "function": {
                    "type": "string",
                    "enum": ["sin", "cos", "tan", "parabola", "cubic", "exponential", "logarithm",
                             "absolute", "sqrt", "reciprocal", "linear"]
                },
                "xMin": number("Left pixel of the plot"),
                "xMax": number("Right pixel of the plot"),
                "yCenter": number("Pixel row of the centre line"),
                "amplitude": number("Vertical extent in pixels"),
                "period": number("Period in pixels for periodic functions"),
                "coefficient": number("Multiplier applied to the function value"),
                "hShift": number("Horizontal shift in pixels"),
                "vShift": number("Vertical shift in pixels, positive is up"),
                "samples": {"type": "integer", "description": "Number of samples"},
                "color": string("CSS color"),
            }),
            &["function", "xMin", "xMax", "yCenter", "amplitude"],
        ),
        ActionKind::DrawCustomCurve => object(
            json!({
                "equation": string("Expression in x, e.g. x^2 - 2sin(x)"),
                "xMin": number("Start of the mathematical domain"),
                "xMax": number("End of the mathematical domain"),
                "canvasXMin": number("Left pixel of the plot"),
                "canvasXMax": number("Right pixel of the plot"),
                "yCenter": number("Pixel row of y = 0"),
                "yScale": number("Pixels per unit of y"),
                "samples": {"type": "integer", "description": "Number of samples"},
                "color": string("CSS color"),
            }),
            &["equation", "xMin", "xMax", "canvasXMin", "canvasXMax", "yCenter", "yScale"],
        ),
        ActionKind::DrawCoordinateSystem => object(
            json!({
                "originX": number("Pixel x of the origin"),
                "originY": number("Pixel y of the origin"),
                "width": number("Pixel width of the x range"),
                "height": number("Pixel height of the y range"),
                "xMin": number("Smallest x value"),
                "xMax": number("Largest x value"),
                "yMin": number("Smallest y value"),
                "yMax": number("Largest y value"),
                "xStep": number("Tick spacing on x"),
                "yStep": number("Tick spacing on y"),
                "showGrid": {"type": "boolean"},
                "showLabels": {"type": "boolean"},
            }),
            &["originX", "originY"],
        ),
        ActionKind::DrawMathSymbol => object(
            json!({
                "symbol": {
                    "type": "string",
                    "enum": ["integral", "derivative", "partial", "sum", "product", "sqrt", "infinity"]
                },
                "x": number("Left edge"),
                "y": number("Top edge"),
                "size": number("Glyph size in pixels"),
                "color": string("CSS color"),
            }),
            &["symbol", "x", "y"],
        ),
        ActionKind::ClearWhiteboard | ActionKind::CaptureScreenshot => object(json!({}), &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_definition_per_kind() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), ActionKind::ALL.len());
        for (def, kind) in defs.iter().zip(ActionKind::ALL) {
            assert_eq!(def.name, kind.as_str());
            assert_eq!(def.parameters_schema["type"], "object");
            assert!(!def.description.is_empty());
        }
    }

    #[test]
    fn test_required_fields_are_declared_properties() {
        for def in tool_definitions() {
            let props = def.parameters_schema["properties"].as_object().unwrap();
            for required in def.parameters_schema["required"].as_array().unwrap() {
                let name = required.as_str().unwrap();
                assert!(props.contains_key(name), "{}: {name}", def.name);
            }
        }
    }

    #[test]
    fn test_realtime_shape() {
        let tools = realtime_tools();
        let eq = tools.iter().find(|t| t["name"] == "draw_equation").unwrap();
        assert_eq!(eq["type"], "function");
        assert_eq!(eq["parameters"]["required"], json!(["latex"]));
    }
}
