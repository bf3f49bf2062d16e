//! Safe drawing rectangle and clamping arithmetic.
//!
//! Everything that ends up on the whiteboard passes through [`SafeBounds`].
//! All functions here are pure and idempotent.

use chalk_core::config::CanvasConfig;
use serde::{Deserialize, Serialize};

/// Default margin kept free on every side of the canvas, in pixels.
pub const DEFAULT_MARGIN: f64 = 40.0;

/// A pixel coordinate on the canvas.
///
/// Deserializes from either `{"x": .., "y": ..}` or `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "PointRepr")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Round both coordinates to whole pixels.
    pub fn rounded(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Object { x: f64, y: f64 },
    Pair([f64; 2]),
}

impl From<PointRepr> for Point {
    fn from(repr: PointRepr) -> Self {
        match repr {
            PointRepr::Object { x, y } => Point::new(x, y),
            PointRepr::Pair([x, y]) => Point::new(x, y),
        }
    }
}

/// Axis-aligned rectangle, `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// The rectangle inside which all rendered geometry must stay.
///
/// Invariant: `min_x < max_x` and `min_y < max_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    canvas_width: f64,
    canvas_height: f64,
    margin: f64,
}

impl SafeBounds {
    /// Derive the safe rectangle from a canvas size and margin.
    ///
    /// Degenerate sizes are widened to 2px and the margin shrinks so that at
    /// least one pixel of drawable area remains on each axis.
    pub fn from_canvas(width: f64, height: f64, margin: f64) -> Self {
        let width = sanitize_extent(width);
        let height = sanitize_extent(height);
        let margin = if margin.is_finite() { margin.max(0.0) } else { 0.0 };
        let margin = margin.min((width.min(height) - 1.0) / 2.0);

        Self {
            min_x: margin,
            max_x: width - margin,
            min_y: margin,
            max_y: height - margin,
            canvas_width: width,
            canvas_height: height,
            margin,
        }
    }

    pub fn with_default_margin(width: f64, height: f64) -> Self {
        Self::from_canvas(width, height, DEFAULT_MARGIN)
    }

    pub fn canvas_width(&self) -> f64 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> f64 {
        self.canvas_height
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn clamp_x(&self, x: f64) -> f64 {
        clamp_finite(x, self.min_x, self.max_x)
    }

    pub fn clamp_y(&self, y: f64) -> f64 {
        clamp_finite(y, self.min_y, self.max_y)
    }

    pub fn clamp(&self, p: Point) -> Point {
        Point::new(self.clamp_x(p.x), self.clamp_y(p.y))
    }

    /// Clamp a point, keeping `reserve_x`/`reserve_y` free before the upper
    /// edges so text or shapes anchored at the point still fit.
    pub fn clamp_with_reserve(&self, p: Point, reserve_x: f64, reserve_y: f64) -> Point {
        let max_x = (self.max_x - reserve_x).max(self.min_x);
        let max_y = (self.max_y - reserve_y).max(self.min_y);
        Point::new(
            clamp_finite(p.x, self.min_x, max_x),
            clamp_finite(p.y, self.min_y, max_y),
        )
    }

    /// Clamp a rectangle so it lies fully inside the bounds.
    ///
    /// Both corners are clamped independently, so out-of-frame parts are cut
    /// off; the rectangle is never shifted to preserve its size.
    pub fn clamp_rect(&self, x: f64, y: f64, w: f64, h: f64) -> (f64, f64, f64, f64) {
        let (x, w) = normalize_span(x, w);
        let (y, h) = normalize_span(y, h);
        let x0 = self.clamp_x(x);
        let y0 = self.clamp_y(y);
        let x1 = self.clamp_x(x + finite_or_zero(w));
        let y1 = self.clamp_y(y + finite_or_zero(h));
        (x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    pub fn clamp_rect_value(&self, rect: Rect) -> Rect {
        let (x, y, width, height) = self.clamp_rect(rect.x, rect.y, rect.width, rect.height);
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp a vertical center line so `inset` pixels remain above and below.
    pub fn clamp_center_y(&self, y: f64, inset: f64) -> f64 {
        let lo = self.min_y + inset;
        let hi = self.max_y - inset;
        if lo > hi {
            // Not enough room for the inset: fall back to the middle.
            return (self.min_y + self.max_y) / 2.0;
        }
        clamp_finite(y, lo, hi)
    }

    /// Distance from `y` to the nearest horizontal edge.
    pub fn vertical_headroom(&self, y: f64) -> f64 {
        (y - self.min_y).min(self.max_y - y).max(0.0)
    }
}

impl From<&CanvasConfig> for SafeBounds {
    fn from(config: &CanvasConfig) -> Self {
        Self::from_canvas(config.width, config.height, config.margin)
    }
}

fn sanitize_extent(v: f64) -> f64 {
    if v.is_finite() { v.max(2.0) } else { 2.0 }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn normalize_span(origin: f64, extent: f64) -> (f64, f64) {
    if extent.is_finite() && extent < 0.0 {
        (origin + extent, -extent)
    } else {
        (origin, extent)
    }
}

/// `f64::clamp` that maps NaN to the lower bound instead of propagating it.
pub(crate) fn clamp_finite(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        return lo;
    }
    v.clamp(lo, hi.max(lo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> SafeBounds {
        SafeBounds::from_canvas(1000.0, 700.0, 40.0)
    }

    #[test]
    fn test_bounds_from_canvas() {
        let b = bounds();
        assert_eq!((b.min_x, b.max_x, b.min_y, b.max_y), (40.0, 960.0, 40.0, 660.0));
        assert!(b.min_x < b.max_x && b.min_y < b.max_y);
    }

    #[test]
    fn test_tiny_canvas_keeps_invariant() {
        for (w, h) in [(0.0, 0.0), (50.0, 10.0), (-5.0, f64::NAN), (81.0, 81.0)] {
            let b = SafeBounds::from_canvas(w, h, 40.0);
            assert!(b.min_x < b.max_x, "{w}x{h}: {b:?}");
            assert!(b.min_y < b.max_y, "{w}x{h}: {b:?}");
        }
    }

    #[test]
    fn test_clamp_contains_and_idempotent() {
        let b = bounds();
        let samples = [
            Point::new(5000.0, -20.0),
            Point::new(-1e9, 1e9),
            Point::new(500.0, 350.0),
            Point::new(f64::NAN, f64::INFINITY),
            Point::new(40.0, 660.0),
        ];
        for p in samples {
            let c = b.clamp(p);
            assert!(b.contains(c), "{p:?} -> {c:?}");
            assert_eq!(b.clamp(c), c);
        }
    }

    #[test]
    fn test_clamp_with_reserve() {
        let b = bounds();
        let p = b.clamp_with_reserve(Point::new(5000.0, -20.0), 100.0, 50.0);
        assert_eq!(p, Point::new(860.0, 40.0));
        let p = b.clamp_with_reserve(Point::new(5000.0, 5000.0), 100.0, 50.0);
        assert_eq!(p, Point::new(860.0, 610.0));
    }

    #[test]
    fn test_clamp_rect_shrinks_instead_of_shifting() {
        let b = bounds();
        let (x, y, w, h) = b.clamp_rect(900.0, 600.0, 300.0, 300.0);
        assert_eq!((x, y), (900.0, 600.0));
        assert_eq!((w, h), (60.0, 60.0));

        let (x, y, w, h) = b.clamp_rect(-100.0, 100.0, 200.0, 50.0);
        assert_eq!((x, y, w, h), (40.0, 100.0, 60.0, 50.0));
    }

    #[test]
    fn test_clamp_rect_negative_extent_and_idempotent() {
        let b = bounds();
        let first = b.clamp_rect(500.0, 500.0, -100.0, -700.0);
        assert_eq!(first, (400.0, 40.0, 100.0, 460.0));
        let again = b.clamp_rect(first.0, first.1, first.2, first.3);
        assert_eq!(first, again);
    }

    #[test]
    fn test_clamp_center_y_and_headroom() {
        let b = bounds();
        assert_eq!(b.clamp_center_y(10.0, 50.0), 90.0);
        assert_eq!(b.clamp_center_y(9000.0, 50.0), 610.0);
        assert_eq!(b.vertical_headroom(350.0), 310.0);
        assert_eq!(b.vertical_headroom(90.0), 50.0);
    }

    #[test]
    fn test_from_canvas_config() {
        let b = SafeBounds::from(&CanvasConfig::default());
        assert_eq!(b, bounds());
    }

    #[test]
    fn test_point_deserializes_both_shapes() {
        let a: Point = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Point = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(a, b);
    }
}
