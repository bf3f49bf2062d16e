//! Coordinate-system chrome: axes, arrowheads, ticks, grid lines, and labels.

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::bounds::{Point, SafeBounds};

const TICK_HALF: f64 = 5.0;
const ARROW_LENGTH: f64 = 10.0;
const ARROW_HALF_WIDTH: f64 = 5.0;
const X_LABEL_OFFSET: f64 = 20.0;
const Y_LABEL_OFFSET: f64 = 25.0;
const MAX_TICKS_PER_AXIS: usize = 100;

/// Declarative coordinate system: where the origin sits, how many pixels it
/// spans and which value range it shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinateSystemSpec {
    /// Pixel position of the mathematical origin.
    pub origin_x: f64,
    pub origin_y: f64,
    /// Pixel extent of the whole value range.
    pub width: f64,
    pub height: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub x_step: f64,
    pub y_step: f64,
    pub show_grid: bool,
    pub show_labels: bool,
}

impl Default for CoordinateSystemSpec {
    fn default() -> Self {
        Self {
            origin_x: 500.0,
            origin_y: 350.0,
            width: 600.0,
            height: 400.0,
            x_min: -5.0,
            x_max: 5.0,
            y_min: -5.0,
            y_max: 5.0,
            x_step: 1.0,
            y_step: 1.0,
            show_grid: false,
            show_labels: true,
        }
    }
}

impl CoordinateSystemSpec {
    /// Normalise ranges and steps so generation never divides by zero.
    pub fn normalized(&self) -> Self {
        let mut spec = self.clone();
        if spec.x_min > spec.x_max {
            std::mem::swap(&mut spec.x_min, &mut spec.x_max);
        }
        if spec.y_min > spec.y_max {
            std::mem::swap(&mut spec.y_min, &mut spec.y_max);
        }
        if !(spec.x_max - spec.x_min).is_normal() {
            spec.x_min -= 1.0;
            spec.x_max += 1.0;
        }
        if !(spec.y_max - spec.y_min).is_normal() {
            spec.y_min -= 1.0;
            spec.y_max += 1.0;
        }
        spec.width = spec.width.abs();
        spec.height = spec.height.abs();
        spec.x_step = sane_step(spec.x_step, spec.x_max - spec.x_min);
        spec.y_step = sane_step(spec.y_step, spec.y_max - spec.y_min);
        spec
    }

    pub fn scale_x(&self) -> f64 {
        self.width / (self.x_max - self.x_min)
    }

    pub fn scale_y(&self) -> f64 {
        self.height / (self.y_max - self.y_min)
    }

    /// Shrink the pixel extent (keeping origin and value ranges) until the
    /// whole plot fits inside `bounds`. The origin itself is clamped first.
    pub fn fit_within(&mut self, bounds: &SafeBounds) {
        *self = self.normalized();
        let origin = bounds.clamp(Point::new(self.origin_x, self.origin_y));
        self.origin_x = origin.x;
        self.origin_y = origin.y;

        let max_sx = max_scale(
            self.origin_x - bounds.min_x,
            bounds.max_x - self.origin_x,
            self.x_min,
            self.x_max,
        );
        let max_sy = max_scale(
            bounds.max_y - self.origin_y,
            self.origin_y - bounds.min_y,
            self.y_min,
            self.y_max,
        );
        if self.scale_x() > max_sx {
            self.width = max_sx * (self.x_max - self.x_min);
        }
        if self.scale_y() > max_sy {
            self.height = max_sy * (self.y_max - self.y_min);
        }
    }
}

/// Largest pixels-per-unit scale that keeps `[min, max]` inside the room
/// available before (`room_neg`) and after (`room_pos`) the origin.
fn max_scale(room_neg: f64, room_pos: f64, min: f64, max: f64) -> f64 {
    let mut scale = f64::INFINITY;
    if min < 0.0 {
        scale = scale.min(room_neg.max(0.0) / -min);
    }
    if max > 0.0 {
        scale = scale.min(room_pos.max(0.0) / max);
    }
    scale
}

fn sane_step(step: f64, range: f64) -> f64 {
    let min_step = range / MAX_TICKS_PER_AXIS as f64;
    if !step.is_finite() || step <= 0.0 {
        return (range / 10.0).max(f64::MIN_POSITIVE);
    }
    step.max(min_step)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

impl Segment {
    pub fn new(from: Point, to: Point) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisLabel {
    pub axis: Axis,
    pub value: f64,
    pub text: String,
    pub position: Point,
}

/// Generated geometry of a coordinate system. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub spec: CoordinateSystemSpec,
    pub axes: Vec<Segment>,
    pub arrows: Vec<Vec<Point>>,
    pub ticks: Vec<Segment>,
    pub labels: Vec<AxisLabel>,
    pub grid_lines: Vec<Segment>,
}

impl CoordinateSystem {
    pub fn generate(spec: &CoordinateSystemSpec, bounds: &SafeBounds) -> Self {
        let spec = spec.normalized();
        let sx = spec.scale_x();
        let sy = spec.scale_y();
        let px = |v: f64| spec.origin_x + v * sx;
        let py = |v: f64| spec.origin_y - v * sy;
        let clamp = |p: Point| bounds.clamp(p).rounded();

        let (left, right) = (px(spec.x_min), px(spec.x_max));
        let (top, bottom) = (py(spec.y_max), py(spec.y_min));
        // Axes sit at value 0, or at the nearest range edge when 0 is outside it.
        let axis_y = py(0.0_f64.clamp(spec.y_min, spec.y_max));
        let axis_x = px(0.0_f64.clamp(spec.x_min, spec.x_max));

        let axes = vec![
            Segment::new(clamp(Point::new(left, axis_y)), clamp(Point::new(right, axis_y))),
            Segment::new(clamp(Point::new(axis_x, bottom)), clamp(Point::new(axis_x, top))),
        ];

        let arrows = vec![
            vec![
                clamp(Point::new(right - ARROW_LENGTH, axis_y - ARROW_HALF_WIDTH)),
                clamp(Point::new(right, axis_y)),
                clamp(Point::new(right - ARROW_LENGTH, axis_y + ARROW_HALF_WIDTH)),
            ],
            vec![
                clamp(Point::new(axis_x - ARROW_HALF_WIDTH, top + ARROW_LENGTH)),
                clamp(Point::new(axis_x, top)),
                clamp(Point::new(axis_x + ARROW_HALF_WIDTH, top + ARROW_LENGTH)),
            ],
        ];

        let mut ticks = Vec::new();
        let mut labels = Vec::new();
        let mut grid_lines = Vec::new();

        for value in tick_values(spec.x_min, spec.x_max, spec.x_step) {
            let x = px(value);
            ticks.push(Segment::new(
                clamp(Point::new(x, axis_y - TICK_HALF)),
                clamp(Point::new(x, axis_y + TICK_HALF)),
            ));
            if spec.show_grid {
                grid_lines.push(Segment::new(clamp(Point::new(x, top)), clamp(Point::new(x, bottom))));
            }
            if spec.show_labels {
                labels.push(AxisLabel {
                    axis: Axis::X,
                    value,
                    text: format_axis_value(value),
                    position: clamp(Point::new(x, axis_y + X_LABEL_OFFSET)),
                });
            }
        }

        for value in tick_values(spec.y_min, spec.y_max, spec.y_step) {
            let y = py(value);
            ticks.push(Segment::new(
                clamp(Point::new(axis_x - TICK_HALF, y)),
                clamp(Point::new(axis_x + TICK_HALF, y)),
            ));
            if spec.show_grid {
                grid_lines.push(Segment::new(clamp(Point::new(left, y)), clamp(Point::new(right, y))));
            }
            if spec.show_labels {
                labels.push(AxisLabel {
                    axis: Axis::Y,
                    value,
                    text: format_axis_value(value),
                    position: clamp(Point::new(axis_x - Y_LABEL_OFFSET, y)),
                });
            }
        }

        Self {
            spec,
            axes,
            arrows,
            ticks,
            labels,
            grid_lines,
        }
    }

    /// Map a point in problem units to canvas pixels.
    pub fn to_pixel(&self, x: f64, y: f64) -> Point {
        Point::new(
            self.spec.origin_x + x * self.spec.scale_x(),
            self.spec.origin_y - y * self.spec.scale_y(),
        )
    }
}

/// Multiples of `step` inside `[min, max]`, excluding the origin.
fn tick_values(min: f64, max: f64, step: f64) -> Vec<f64> {
    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last)
        .filter(|k| *k != 0)
        .take(MAX_TICKS_PER_AXIS * 2)
        .map(|k| k as f64 * step)
        .collect()
}

const PI_LABEL_TOLERANCE: f64 = 1e-9;
/// Beyond this many half-turns a value is labelled numerically.
const MAX_PI_HALVES: f64 = 1e6;

/// Human-readable axis label. Multiples of π/2 become symbolic (`π`, `-π`,
/// `3π/2`, ...); anything else is printed with one decimal place.
pub fn format_axis_value(value: f64) -> String {
    let halves = (value / FRAC_PI_2).round();
    if halves != 0.0 && halves.abs() <= MAX_PI_HALVES && (value - halves * FRAC_PI_2).abs() < PI_LABEL_TOLERANCE {
        let n = halves as i64;
        return if n % 2 == 0 {
            match n / 2 {
                1 => "π".to_string(),
                -1 => "-π".to_string(),
                m => format!("{m}π"),
            }
        } else {
            match n {
                1 => "π/2".to_string(),
                -1 => "-π/2".to_string(),
                n => format!("{n}π/2"),
            }
        };
    }
    format!("{value:.1}")
}
