//! Stroke glyphs for common math symbols.
//!
//! Glyphs are drawn inside a `size`×`size` box whose top-left corner is the
//! origin. They do not go through the curve engine's domain logic.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bounds::Point;

const ARC_STEPS: usize = 24;
const LEMNISCATE_STEPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathSymbol {
    Integral,
    Derivative,
    Partial,
    Sum,
    Product,
    Sqrt,
    Infinity,
}

impl MathSymbol {
    pub fn parse(name: &str) -> Option<Self> {
        let symbol = match name.trim().to_ascii_lowercase().as_str() {
            "integral" | "∫" => Self::Integral,
            "derivative" | "d/dx" => Self::Derivative,
            "partial" | "∂" => Self::Partial,
            "sum" | "sigma" | "∑" | "Σ" => Self::Sum,
            "product" | "pi_product" | "∏" => Self::Product,
            "sqrt" | "root" | "√" => Self::Sqrt,
            "infinity" | "inf" | "∞" => Self::Infinity,
            _ => return None,
        };
        Some(symbol)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integral => "integral",
            Self::Derivative => "derivative",
            Self::Partial => "partial",
            Self::Sum => "sum",
            Self::Product => "product",
            Self::Sqrt => "sqrt",
            Self::Infinity => "infinity",
        }
    }

    /// Strokes for this glyph, rounded to whole pixels.
    pub fn strokes(&self, origin: Point, size: f64) -> Vec<Vec<Point>> {
        let g = Glyph { origin, size };
        let strokes = match self {
            Self::Integral => vec![g.integral()],
            Self::Derivative => g.derivative(),
            Self::Partial => g.partial(),
            Self::Sum => vec![g.polyline(&[(0.8, 0.0), (0.1, 0.0), (0.5, 0.5), (0.1, 1.0), (0.8, 1.0)])],
            Self::Product => vec![
                g.polyline(&[(0.1, 0.0), (0.9, 0.0)]),
                g.polyline(&[(0.25, 0.0), (0.25, 1.0)]),
                g.polyline(&[(0.75, 0.0), (0.75, 1.0)]),
            ],
            Self::Sqrt => vec![g.polyline(&[(0.0, 0.6), (0.15, 0.5), (0.3, 1.0), (0.5, 0.0), (1.0, 0.0)])],
            Self::Infinity => vec![g.lemniscate()],
        };
        strokes
            .into_iter()
            .map(|stroke| stroke.into_iter().map(Point::rounded).collect())
            .collect()
    }
}

/// Strokes for a symbol by name. Unknown names draw nothing.
pub fn symbol_strokes(name: &str, origin: Point, size: f64) -> Vec<Vec<Point>> {
    match MathSymbol::parse(name) {
        Some(symbol) => symbol.strokes(origin, size),
        None => {
            warn!(symbol = name, "Unknown math symbol");
            Vec::new()
        }
    }
}

/// Unit-box helper: coordinates in `[0, 1]` scaled into the glyph box.
struct Glyph {
    origin: Point,
    size: f64,
}

impl Glyph {
    fn at(&self, u: f64, v: f64) -> Point {
        Point::new(self.origin.x + u * self.size, self.origin.y + v * self.size)
    }

    fn polyline(&self, coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(u, v)| self.at(u, v)).collect()
    }

    fn arc(&self, cu: f64, cv: f64, r: f64, from: f64, to: f64) -> Vec<Point> {
        (0..=ARC_STEPS)
            .map(|i| {
                let t = from + (to - from) * i as f64 / ARC_STEPS as f64;
                self.at(cu + r * t.cos(), cv + r * t.sin())
            })
            .collect()
    }

    /// Tall S-curve: top hook to the right, bottom hook to the left.
    fn integral(&self) -> Vec<Point> {
        (0..=ARC_STEPS * 2)
            .map(|i| {
                let s = 2.0 * i as f64 / (ARC_STEPS * 2) as f64 - 1.0;
                let u = 0.5 - 0.2 * (PI * s).sin() - 0.05 * s;
                self.at(u, (s + 1.0) / 2.0)
            })
            .collect()
    }

    /// `d` over `dx` with a fraction bar.
    fn derivative(&self) -> Vec<Vec<Point>> {
        vec![
            self.arc(0.35, 0.3, 0.12, 0.0, TAU),
            self.polyline(&[(0.47, 0.0), (0.47, 0.42)]),
            self.polyline(&[(0.0, 0.5), (1.0, 0.5)]),
            self.arc(0.25, 0.8, 0.12, 0.0, TAU),
            self.polyline(&[(0.37, 0.58), (0.37, 0.92)]),
            self.polyline(&[(0.55, 0.68), (0.8, 0.92)]),
            self.polyline(&[(0.55, 0.92), (0.8, 0.68)]),
        ]
    }

    /// Round bowl with a hook curling back over the top.
    fn partial(&self) -> Vec<Vec<Point>> {
        let bowl = self.arc(0.45, 0.68, 0.25, 0.0, TAU);
        let hook = (0..=ARC_STEPS)
            .map(|i| {
                let t = i as f64 / ARC_STEPS as f64;
                let (p0, p1, p2) = ((0.7, 0.68), (0.8, 0.0), (0.3, 0.08));
                let u = (1.0 - t).powi(2) * p0.0 + 2.0 * (1.0 - t) * t * p1.0 + t * t * p2.0;
                let v = (1.0 - t).powi(2) * p0.1 + 2.0 * (1.0 - t) * t * p1.1 + t * t * p2.1;
                self.at(u, v)
            })
            .collect();
        vec![bowl, hook]
    }

    /// Lemniscate of Bernoulli centred in the box.
    fn lemniscate(&self) -> Vec<Point> {
        let a = 0.5;
        (0..=LEMNISCATE_STEPS)
            .map(|i| {
                let t = TAU * i as f64 / LEMNISCATE_STEPS as f64;
                let denom = 1.0 + t.sin().powi(2);
                self.at(0.5 + a * t.cos() / denom, 0.5 + a * t.sin() * t.cos() / denom)
            })
            .collect()
    }
}
