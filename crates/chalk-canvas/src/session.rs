//! In-memory canvas session with SVG export.

use std::fmt::Write as _;

use base64::Engine;
use chrono::{DateTime, Utc};

use crate::protocol::ShapeKind;
use crate::surface::{CanvasElement, CanvasSurface, ExportedImage, TextStyle};

/// A canvas session holds the board's elements for one tutoring session.
#[derive(Debug, Clone)]
pub struct CanvasSession {
    pub session_id: String,
    pub width: f64,
    pub height: f64,
    elements: Vec<CanvasElement>,
    export_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CanvasSession {
    pub fn new(session_id: impl Into<String>, width: f64, height: f64) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            width,
            height,
            elements: Vec::new(),
            export_enabled: true,
            created_at: now,
            last_updated: now,
        }
    }

    /// A session whose export capability is not ready.
    pub fn without_export(mut self) -> Self {
        self.export_enabled = false;
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Render the board as a standalone SVG document.
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        let _ = write!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        for element in &self.elements {
            svg.push('\n');
            render_element(&mut svg, element);
        }
        svg.push_str("\n</svg>\n");
        svg
    }
}

fn render_element(out: &mut String, element: &CanvasElement) {
    match element {
        CanvasElement::Stroke {
            id,
            points,
            color,
            width,
        } => {
            let coords: Vec<String> = points.iter().map(|p| format!("{},{}", p.x, p.y)).collect();
            let _ = write!(
                out,
                r#"<polyline id="{id}" points="{}" fill="none" stroke="{}" stroke-width="{width}" stroke-linecap="round" stroke-linejoin="round"/>"#,
                coords.join(" "),
                escape(color)
            );
        }
        CanvasElement::Text {
            id,
            text,
            position,
            font_size,
            color,
            style,
        } => {
            let family = match style {
                TextStyle::Plain => "sans-serif",
                TextStyle::Latex => "serif",
                TextStyle::Handwriting => "cursive",
            };
            let _ = write!(
                out,
                r#"<text id="{id}" x="{}" y="{}" font-size="{font_size}" font-family="{family}" fill="{}" dominant-baseline="hanging">{}</text>"#,
                position.x,
                position.y,
                escape(color),
                escape(text)
            );
        }
        CanvasElement::Shape {
            id,
            shape,
            rect,
            color,
            filled,
        } => {
            let color = escape(color);
            let fill = if *filled { color.as_str() } else { "none" };
            let (x0, y0, x1, y1) = (rect.x, rect.y, rect.x + rect.width, rect.y + rect.height);
            let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
            let _ = match shape {
                ShapeKind::Rectangle => write!(
                    out,
                    r#"<rect id="{id}" x="{x0}" y="{y0}" width="{}" height="{}" fill="{fill}" stroke="{color}" stroke-width="2"/>"#,
                    rect.width, rect.height
                ),
                ShapeKind::Circle => write!(
                    out,
                    r#"<circle id="{id}" cx="{cx}" cy="{cy}" r="{}" fill="{fill}" stroke="{color}" stroke-width="2"/>"#,
                    rect.width.min(rect.height) / 2.0
                ),
                ShapeKind::Ellipse => write!(
                    out,
                    r#"<ellipse id="{id}" cx="{cx}" cy="{cy}" rx="{}" ry="{}" fill="{fill}" stroke="{color}" stroke-width="2"/>"#,
                    rect.width / 2.0,
                    rect.height / 2.0
                ),
                ShapeKind::Line | ShapeKind::Arrow => write!(
                    out,
                    r#"<line id="{id}" x1="{x0}" y1="{y0}" x2="{x1}" y2="{y1}" stroke="{color}" stroke-width="2"/>"#
                ),
                ShapeKind::Triangle => write!(
                    out,
                    r#"<polygon id="{id}" points="{cx},{y0} {x1},{y1} {x0},{y1}" fill="{fill}" stroke="{color}" stroke-width="2"/>"#
                ),
            };
        }
        CanvasElement::Highlight { id, rect, color } => {
            let _ = write!(
                out,
                r#"<rect id="{id}" x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="none"/>"#,
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                escape(color)
            );
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl CanvasSurface for CanvasSession {
    fn elements(&self) -> &[CanvasElement] {
        &self.elements
    }

    fn append(&mut self, elements: Vec<CanvasElement>) {
        if elements.is_empty() {
            return;
        }
        self.elements.extend(elements);
        self.last_updated = Utc::now();
    }

    fn reset(&mut self) {
        self.elements.clear();
        self.last_updated = Utc::now();
    }

    fn export_image(&self) -> Option<ExportedImage> {
        if !self.export_enabled {
            return None;
        }
        let svg = self.to_svg();
        Some(ExportedImage {
            mime_type: "image/svg+xml".into(),
            data: base64::engine::general_purpose::STANDARD.encode(svg.as_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{Point, Rect};

    fn stroke(id: &str) -> CanvasElement {
        CanvasElement::Stroke {
            id: id.into(),
            points: vec![Point::new(40.0, 40.0), Point::new(100.0, 80.0)],
            color: "#111".into(),
            width: 2.0,
        }
    }

    #[test]
    fn test_canvas_session() {
        let mut session = CanvasSession::new("test-1", 1000.0, 700.0);
        assert!(session.is_empty());

        session.append(vec![stroke("a")]);
        assert_eq!(session.len(), 1);

        session.append(vec![stroke("b"), stroke("c")]);
        assert_eq!(session.len(), 3);
        assert_eq!(session.elements()[2].id(), "c");

        session.reset();
        assert!(session.is_empty());
        assert!(session.last_updated >= session.created_at);
    }

    #[test]
    fn test_svg_export_escapes_text() {
        let mut session = CanvasSession::new("svg", 200.0, 100.0);
        session.append(vec![
            stroke("s1"),
            CanvasElement::Text {
                id: "t1".into(),
                text: "a < b & c".into(),
                position: Point::new(50.0, 50.0),
                font_size: 16.0,
                color: "black".into(),
                style: TextStyle::Plain,
            },
            CanvasElement::Highlight {
                id: "h1".into(),
                rect: Rect {
                    x: 10.0,
                    y: 10.0,
                    width: 20.0,
                    height: 20.0,
                },
                color: "yellow".into(),
            },
        ]);
        let svg = session.to_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"points="40,40 100,80""#));
        assert!(svg.contains("a &lt; b &amp; c"));
        assert!(svg.contains(r#"id="h1""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_export_image_is_base64_svg() {
        let session = CanvasSession::new("img", 100.0, 100.0);
        let image = session.export_image().unwrap();
        assert_eq!(image.mime_type, "image/svg+xml");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&image.data)
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), session.to_svg());
        assert!(image.data_url().starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn test_export_unavailable() {
        let session = CanvasSession::new("img", 100.0, 100.0).without_export();
        assert!(session.export_image().is_none());
    }
}
