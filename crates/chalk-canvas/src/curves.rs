//! Curve generation: maps named functions and custom equations to pixel paths.
//!
//! The domain `[x_min, x_max]` is normalised to `u ∈ [-1, 1]` (and `t ∈ [0, 1]`)
//! before a function is applied, so `amplitude` means roughly the same vertical
//! extent whatever the function. Every sample is clamped to the safe band
//! `[margin, canvas_height - margin]` and rounded to integer pixels here, before
//! the action-level validation clamps it again.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::{Point, SafeBounds};
use crate::expr::{Expr, ExprError};

pub const DEFAULT_SAMPLES: usize = 100;
pub const MAX_SAMPLES: usize = 2000;

/// Raw tangent values are clamped into `[-TAN_LIMIT, TAN_LIMIT]`.
const TAN_LIMIT: f64 = 10.0;
/// Reciprocal samples with `|u|` below this are treated as the pole.
const RECIPROCAL_POLE: f64 = 0.05;
const RECIPROCAL_LIMIT: f64 = 10.0;
/// Growth rate of the normalised exponential.
const EXP_RATE: f64 = 3.0;

/// Named function understood by the curve engine.
///
/// Deserialization never fails: unknown names become [`CurveFunction::Linear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum CurveFunction {
    Sin,
    Cos,
    Tan,
    Parabola,
    Cubic,
    Exponential,
    Logarithm,
    Absolute,
    Sqrt,
    Reciprocal,
    #[default]
    Linear,
}

impl CurveFunction {
    /// Parse a function name. Unknown names fall back to [`CurveFunction::Linear`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sin" | "sine" => Self::Sin,
            "cos" | "cosine" => Self::Cos,
            "tan" | "tangent" => Self::Tan,
            "parabola" | "quadratic" | "x^2" => Self::Parabola,
            "cubic" | "x^3" => Self::Cubic,
            "exponential" | "exp" => Self::Exponential,
            "logarithm" | "log" | "ln" => Self::Logarithm,
            "absolute" | "abs" => Self::Absolute,
            "sqrt" | "square_root" => Self::Sqrt,
            "reciprocal" | "1/x" | "inverse" => Self::Reciprocal,
            "linear" | "line" => Self::Linear,
            other => {
                debug!(function = other, "Unknown curve function, using linear");
                Self::Linear
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Parabola => "parabola",
            Self::Cubic => "cubic",
            Self::Exponential => "exponential",
            Self::Logarithm => "logarithm",
            Self::Absolute => "absolute",
            Self::Sqrt => "sqrt",
            Self::Reciprocal => "reciprocal",
            Self::Linear => "linear",
        }
    }
}

impl From<String> for CurveFunction {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

/// Declarative description of a named curve in canvas pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSpec {
    pub function: CurveFunction,
    pub x_min: f64,
    pub x_max: f64,
    /// Vertical pixel line the curve oscillates around.
    pub y_center: f64,
    pub amplitude: f64,
    /// Period in pixels for periodic functions (default: half the domain).
    pub period: Option<f64>,
    pub coefficient: Option<f64>,
    /// Horizontal shift in pixels (positive moves the curve right).
    pub h_shift: f64,
    /// Vertical shift in pixels (positive moves the curve up).
    pub v_shift: f64,
    pub samples: usize,
}

impl CurveSpec {
    pub fn new(function: CurveFunction, x_min: f64, x_max: f64, y_center: f64, amplitude: f64) -> Self {
        Self {
            function,
            x_min,
            x_max,
            y_center,
            amplitude,
            period: None,
            coefficient: None,
            h_shift: 0.0,
            v_shift: 0.0,
            samples: DEFAULT_SAMPLES,
        }
    }
}

/// Sample a named curve into a single ordered point list.
pub fn generate_curve(spec: &CurveSpec, bounds: &SafeBounds) -> Vec<Point> {
    generate_curve_segments(spec, bounds).into_iter().flatten().collect()
}

/// Sample a named curve, splitting the path wherever samples were skipped
/// (outside the function's domain) or the curve jumps across an asymptote.
pub fn generate_curve_segments(spec: &CurveSpec, bounds: &SafeBounds) -> Vec<Vec<Point>> {
    let samples = spec.samples.clamp(2, MAX_SAMPLES);
    let (x0, x1) = ordered(spec.x_min, spec.x_max);
    let width = x1 - x0;
    if !width.is_finite() || width <= f64::EPSILON {
        let y = band_clamp(spec.y_center, bounds);
        return vec![vec![Point::new(x0, y).rounded()]];
    }

    let period = spec
        .period
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or(width / 2.0);
    let coefficient = spec.coefficient.filter(|c| c.is_finite()).unwrap_or(1.0);
    let amplitude = if spec.amplitude.is_finite() { spec.amplitude } else { 0.0 };

    let mut segments: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut previous: Option<f64> = None;

    for i in 0..samples {
        let x = x0 + width * i as f64 / (samples - 1) as f64;
        let value = evaluate(spec.function, x - x0 - spec.h_shift, width, period)
            .map(|v| v * coefficient)
            .filter(|v| v.is_finite());

        let Some(value) = value else {
            flush(&mut segments, &mut current);
            previous = None;
            continue;
        };

        // A sign flip at large magnitude means we stepped over an asymptote.
        if matches!(spec.function, CurveFunction::Tan | CurveFunction::Reciprocal) {
            if let Some(prev) = previous {
                if prev.signum() != value.signum() && (prev - value).abs() > 1.0 {
                    flush(&mut segments, &mut current);
                }
            }
        }
        previous = Some(value);

        let y = spec.y_center - spec.v_shift - amplitude * value;
        current.push(Point::new(x, band_clamp(y, bounds)).rounded());
    }
    flush(&mut segments, &mut current);
    segments
}

/// Evaluate the normalised function at `dx` pixels from the domain start.
///
/// Returns `None` when the input lies outside the function's domain.
fn evaluate(function: CurveFunction, dx: f64, width: f64, period: f64) -> Option<f64> {
    let t = dx / width;
    let u = 2.0 * t - 1.0;
    let phase = 2.0 * PI * dx / period;

    let value = match function {
        CurveFunction::Sin => phase.sin(),
        CurveFunction::Cos => phase.cos(),
        CurveFunction::Tan => {
            let raw = (PI * dx / period).tan();
            if !raw.is_finite() {
                return None;
            }
            raw.clamp(-TAN_LIMIT, TAN_LIMIT) / TAN_LIMIT
        }
        CurveFunction::Parabola => 2.0 * u * u - 1.0,
        CurveFunction::Cubic => u * u * u,
        CurveFunction::Exponential => {
            2.0 * (EXP_RATE * t).exp_m1() / EXP_RATE.exp_m1() - 1.0
        }
        CurveFunction::Logarithm => {
            let arg = 1.0 + 9.0 * t;
            if arg <= 0.0 {
                return None;
            }
            2.0 * arg.log10() - 1.0
        }
        CurveFunction::Absolute => 2.0 * u.abs() - 1.0,
        CurveFunction::Sqrt => {
            if t < 0.0 {
                return None;
            }
            2.0 * t.sqrt() - 1.0
        }
        CurveFunction::Reciprocal => {
            if u.abs() < RECIPROCAL_POLE {
                return None;
            }
            (1.0 / u).clamp(-RECIPROCAL_LIMIT, RECIPROCAL_LIMIT) / RECIPROCAL_LIMIT
        }
        CurveFunction::Linear => u,
    };
    Some(value)
}

/// Custom equation curve: a mathematical domain mapped onto a pixel domain.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomCurveSpec {
    pub equation: String,
    /// Mathematical domain, in problem units.
    pub x_min: f64,
    pub x_max: f64,
    /// Pixel span the mathematical domain is drawn across.
    pub canvas_x_min: f64,
    pub canvas_x_max: f64,
    /// Pixel row of `y = 0`.
    pub y_center: f64,
    /// Pixels per unit on the y axis.
    pub y_scale: f64,
    pub samples: usize,
}

/// Evaluate a custom equation and map each `(x, f(x))` into canvas pixels.
pub fn generate_custom_curve(
    spec: &CustomCurveSpec,
    bounds: &SafeBounds,
) -> Result<Vec<Vec<Point>>, ExprError> {
    let expr = Expr::parse(&spec.equation)?;
    let samples = spec.samples.clamp(2, MAX_SAMPLES);
    let (x0, x1) = (spec.x_min, spec.x_max);
    let math_width = x1 - x0;
    let pixel_width = spec.canvas_x_max - spec.canvas_x_min;
    if !math_width.is_finite() || math_width.abs() <= f64::EPSILON {
        return Ok(Vec::new());
    }

    let y_scale = if spec.y_scale.is_finite() { spec.y_scale } else { 1.0 };
    let (band_lo, band_hi) = band(bounds);

    let mut segments: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut previous_raw: Option<f64> = None;

    for i in 0..samples {
        let fraction = i as f64 / (samples - 1) as f64;
        let x = x0 + math_width * fraction;
        let y = expr.eval(x);
        if !y.is_finite() {
            flush(&mut segments, &mut current);
            previous_raw = None;
            continue;
        }

        let raw_py = spec.y_center - y * y_scale;
        // Crossing the whole band in one step is an asymptote, not curve.
        if let Some(prev) = previous_raw {
            let crossed = (prev < band_lo && raw_py > band_hi) || (prev > band_hi && raw_py < band_lo);
            if crossed {
                flush(&mut segments, &mut current);
            }
        }
        previous_raw = Some(raw_py);

        let px = spec.canvas_x_min + pixel_width * fraction;
        current.push(Point::new(bounds.clamp_x(px), band_clamp(raw_py, bounds)).rounded());
    }
    flush(&mut segments, &mut current);
    Ok(segments)
}

fn flush(segments: &mut Vec<Vec<Point>>, current: &mut Vec<Point>) {
    if !current.is_empty() {
        segments.push(std::mem::take(current));
    }
}

/// The function-local vertical band `[margin, canvas_height - margin]`.
fn band(bounds: &SafeBounds) -> (f64, f64) {
    (bounds.margin(), bounds.canvas_height() - bounds.margin())
}

fn band_clamp(y: f64, bounds: &SafeBounds) -> f64 {
    let (lo, hi) = band(bounds);
    crate::bounds::clamp_finite(y, lo, hi)
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> SafeBounds {
        SafeBounds::from_canvas(1000.0, 700.0, 40.0)
    }

    fn all_functions() -> [CurveFunction; 11] {
        [
            CurveFunction::Sin,
            CurveFunction::Cos,
            CurveFunction::Tan,
            CurveFunction::Parabola,
            CurveFunction::Cubic,
            CurveFunction::Exponential,
            CurveFunction::Logarithm,
            CurveFunction::Absolute,
            CurveFunction::Sqrt,
            CurveFunction::Reciprocal,
            CurveFunction::Linear,
        ]
    }

    #[test]
    fn test_sin_large_amplitude_stays_in_band() {
        let mut spec = CurveSpec::new(CurveFunction::Sin, 40.0, 960.0, 350.0, 1000.0);
        spec.period = Some(200.0);
        let points = generate_curve(&spec, &bounds());
        assert_eq!(points.len(), DEFAULT_SAMPLES);
        assert!(points.iter().all(|p| p.y >= 40.0 && p.y <= 660.0));
        // The amplitude really was large: both edges of the band are hit.
        assert!(points.iter().any(|p| p.y == 40.0));
        assert!(points.iter().any(|p| p.y == 660.0));
    }

    #[test]
    fn test_every_function_stays_in_band() {
        let b = bounds();
        for function in all_functions() {
            for amplitude in [0.0, 50.0, 400.0, 1e6, -1e6] {
                let mut spec = CurveSpec::new(function, -500.0, 2000.0, 350.0, amplitude);
                spec.h_shift = 37.0;
                spec.v_shift = -20.0;
                for p in generate_curve(&spec, &b) {
                    assert!(p.y >= 40.0 && p.y <= 660.0, "{function:?} {amplitude}: {p:?}");
                    assert!(p.is_finite());
                    assert_eq!(p.y, p.y.round());
                    assert_eq!(p.x, p.x.round());
                }
            }
        }
    }

    #[test]
    fn test_tan_contribution_bounded_by_amplitude() {
        let b = SafeBounds::from_canvas(10_000.0, 10_000.0, 40.0);
        let amplitude = 100.0;
        let y_center = 5000.0;
        let mut spec = CurveSpec::new(CurveFunction::Tan, 100.0, 900.0, y_center, amplitude);
        spec.samples = 1000;
        let points = generate_curve(&spec, &b);
        assert!(!points.is_empty());
        for p in points {
            assert!((p.y - y_center).abs() <= amplitude + 0.5, "{p:?}");
        }
    }

    #[test]
    fn test_sqrt_skips_negative_domain() {
        let mut spec = CurveSpec::new(CurveFunction::Sqrt, 0.0, 1000.0, 350.0, 100.0);
        // Shift right by half the domain: the left half is undefined.
        spec.h_shift = 500.0;
        spec.samples = 101;
        let points = generate_curve(&spec, &bounds());
        assert!(points.iter().all(|p| p.x >= 500.0), "{points:?}");
        assert_eq!(points.len(), 51);
    }

    #[test]
    fn test_reciprocal_skips_pole() {
        let mut spec = CurveSpec::new(CurveFunction::Reciprocal, 0.0, 1000.0, 350.0, 200.0);
        spec.samples = 201;
        let segments = generate_curve_segments(&spec, &bounds());
        assert_eq!(segments.len(), 2, "path should break at the pole");
        let points: Vec<Point> = segments.concat();
        // u = 2x/1000 - 1, pole band |u| < 0.05 → 475 < x < 525
        assert!(points.iter().all(|p| p.x <= 475.0 || p.x >= 525.0), "{points:?}");
    }

    #[test]
    fn test_parabola_is_symmetric() {
        let spec = CurveSpec::new(CurveFunction::Parabola, 100.0, 900.0, 350.0, 200.0);
        let points = generate_curve(&spec, &bounds());
        let first = points.first().unwrap();
        let last = points.last().unwrap();
        assert_eq!(first.y, last.y);
        assert_eq!(first.y, 150.0);
    }

    #[test]
    fn test_unknown_function_falls_back_to_linear() {
        assert_eq!(CurveFunction::parse("zigzag"), CurveFunction::Linear);
        assert_eq!(CurveFunction::parse(" Sine "), CurveFunction::Sin);
        assert_eq!(CurveFunction::parse("1/x"), CurveFunction::Reciprocal);
    }

    #[test]
    fn test_degenerate_domain_yields_single_point() {
        let spec = CurveSpec::new(CurveFunction::Sin, 300.0, 300.0, 9000.0, 50.0);
        let points = generate_curve(&spec, &bounds());
        assert_eq!(points, vec![Point::new(300.0, 660.0)]);
    }

    #[test]
    fn test_custom_curve_maps_math_domain_to_pixels() {
        let spec = CustomCurveSpec {
            equation: "x^2".into(),
            x_min: -2.0,
            x_max: 2.0,
            canvas_x_min: 100.0,
            canvas_x_max: 500.0,
            y_center: 400.0,
            y_scale: 50.0,
            samples: 5,
        };
        let segments = generate_custom_curve(&spec, &bounds()).unwrap();
        assert_eq!(segments.len(), 1);
        let xs: Vec<f64> = segments[0].iter().map(|p| p.x).collect();
        let ys: Vec<f64> = segments[0].iter().map(|p| p.y).collect();
        assert_eq!(xs, vec![100.0, 200.0, 300.0, 400.0, 500.0]);
        assert_eq!(ys, vec![200.0, 350.0, 400.0, 350.0, 200.0]);
    }

    #[test]
    fn test_custom_curve_skips_undefined_samples() {
        let spec = CustomCurveSpec {
            equation: "sqrt(x)".into(),
            x_min: -1.0,
            x_max: 1.0,
            canvas_x_min: 100.0,
            canvas_x_max: 300.0,
            y_center: 400.0,
            y_scale: 100.0,
            samples: 21,
        };
        let points: Vec<Point> = generate_custom_curve(&spec, &bounds()).unwrap().concat();
        assert_eq!(points.len(), 11);
        assert!(points.iter().all(|p| p.x >= 200.0));
    }

    #[test]
    fn test_custom_curve_breaks_at_asymptote() {
        let spec = CustomCurveSpec {
            equation: "1/x".into(),
            x_min: -1.0,
            x_max: 1.0,
            canvas_x_min: 100.0,
            canvas_x_max: 900.0,
            y_center: 350.0,
            y_scale: 1000.0,
            samples: 20,
        };
        let segments = generate_custom_curve(&spec, &bounds()).unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_custom_curve_invalid_equation() {
        let spec = CustomCurveSpec {
            equation: "sin(x".into(),
            x_min: 0.0,
            x_max: 1.0,
            canvas_x_min: 0.0,
            canvas_x_max: 100.0,
            y_center: 300.0,
            y_scale: 10.0,
            samples: 10,
        };
        assert!(generate_custom_curve(&spec, &bounds()).is_err());
    }
}
