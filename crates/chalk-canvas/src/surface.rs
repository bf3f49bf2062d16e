//! The drawing surface seen by the executor.

use serde::{Deserialize, Serialize};

use crate::bounds::{Point, Rect};
use crate::protocol::ShapeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    Plain,
    Latex,
    Handwriting,
}

/// One element on the board. Elements are never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanvasElement {
    Stroke {
        id: String,
        points: Vec<Point>,
        color: String,
        width: f64,
    },
    Text {
        id: String,
        text: String,
        position: Point,
        font_size: f64,
        color: String,
        style: TextStyle,
    },
    Shape {
        id: String,
        shape: ShapeKind,
        rect: Rect,
        color: String,
        filled: bool,
    },
    Highlight {
        id: String,
        rect: Rect,
        color: String,
    },
}

impl CanvasElement {
    pub fn id(&self) -> &str {
        match self {
            Self::Stroke { id, .. }
            | Self::Text { id, .. }
            | Self::Shape { id, .. }
            | Self::Highlight { id, .. } => id,
        }
    }
}

/// An encoded snapshot of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedImage {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl ExportedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Minimal drawing surface contract.
pub trait CanvasSurface: Send {
    fn elements(&self) -> &[CanvasElement];

    fn append(&mut self, elements: Vec<CanvasElement>);

    fn reset(&mut self);

    /// `None` when the surface cannot export right now.
    fn export_image(&self) -> Option<ExportedImage>;
}
