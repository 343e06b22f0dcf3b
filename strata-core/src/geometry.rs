//! Coordinate spaces, grid snapping and resize math.
//!
//! Three coordinate spaces are in play:
//!
//! ```text
//! screen  ──(Viewport)──▶  world  ──(Frame)──▶  local
//! pixels on the host       canvas units         layer-centred, unrotated
//! ```
//!
//! Everything in this module is a pure function of its inputs.

use serde::{Deserialize, Serialize};

/// Smallest width or height a layer may have, in world units.
pub const MIN_LAYER_SIZE: f64 = 10.0;

/// Default grid pitch used for snapping and stepped scaling.
pub const DEFAULT_GRID_SIZE: f64 = 64.0;

/// Lowest viewport zoom.
pub const MIN_ZOOM: f64 = 0.1;

/// Highest viewport zoom.
pub const MAX_ZOOM: f64 = 10.0;

const EPSILON: f64 = 1e-9;

/// A 2D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate (grows downward).
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Return this point shifted by `(dx, dy)`.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Vector from `other` to `self`.
    #[must_use]
    pub fn delta_from(self, other: Self) -> (f64, f64) {
        (self.x - other.x, self.y - other.y)
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width (never negative).
    pub width: f64,
    /// Height (never negative).
    pub height: f64,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Normalized rectangle spanning two arbitrary corners.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Return the rectangle shifted by `(dx, dy)`.
    #[must_use]
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// Placement of a layer: top-left corner, size, and rotation about the centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Left edge of the unrotated frame.
    pub x: f64,
    /// Top edge of the unrotated frame.
    pub y: f64,
    /// Width in world units.
    pub width: f64,
    /// Height in world units.
    pub height: f64,
    /// Rotation in degrees, clockwise on screen.
    pub rotation: f64,
}

impl Frame {
    /// Create a frame.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64, rotation: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            rotation,
        }
    }

    /// Build a frame from its centre point.
    #[must_use]
    pub fn from_center(center: Point, width: f64, height: f64, rotation: f64) -> Self {
        Self {
            x: center.x - width / 2.0,
            y: center.y - height / 2.0,
            width,
            height,
            rotation,
        }
    }

    /// Centre of the frame in world space.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Width divided by height.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// Rotate a vector about the origin by `degrees`.
#[must_use]
pub fn rotate(p: Point, degrees: f64) -> Point {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Point::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos)
}

/// Map a world point into the frame's local space.
///
/// The result is relative to the frame centre, in the frame's unrotated axes,
/// so the top-left corner of the layer is `(-width / 2, -height / 2)`.
#[must_use]
pub fn world_to_local(world: Point, frame: &Frame) -> Point {
    let center = frame.center();
    rotate(
        Point::new(world.x - center.x, world.y - center.y),
        -frame.rotation,
    )
}

/// Inverse of [`world_to_local`].
#[must_use]
pub fn local_to_world(local: Point, frame: &Frame) -> Point {
    let center = frame.center();
    let rotated = rotate(local, frame.rotation);
    Point::new(center.x + rotated.x, center.y + rotated.y)
}

/// Quantize `value` down to a multiple of `grid`.
///
/// `snap_to_grid(130.0, 64.0) == 128.0` and `snap_to_grid(97.0, 64.0) == 64.0`.
/// A non-positive grid leaves the value untouched.
#[must_use]
pub fn snap_to_grid(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).floor() * grid
}

/// Closest grid line to `value`.
#[must_use]
pub fn nearest_grid_line(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

/// Axis-aligned bounding rectangle of a rotated frame.
#[must_use]
pub fn bounding_rect(frame: &Frame) -> Rect {
    let hw = frame.width / 2.0;
    let hh = frame.height / 2.0;
    let corners = [
        Point::new(-hw, -hh),
        Point::new(hw, -hh),
        Point::new(hw, hh),
        Point::new(-hw, hh),
    ]
    .map(|c| local_to_world(c, frame));

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for c in corners {
        min_x = min_x.min(c.x);
        min_y = min_y.min(c.y);
        max_x = max_x.max(c.x);
        max_y = max_y.max(c.y);
    }
    Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

/// Translation that would put an edge of a frame's bounding box onto the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapAdjustment {
    /// Horizontal correction.
    pub dx: f64,
    /// Vertical correction.
    pub dy: f64,
}

impl SnapAdjustment {
    /// No correction.
    pub const NONE: Self = Self { dx: 0.0, dy: 0.0 };

    /// True when neither axis moves.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.dx.abs() < f64::EPSILON && self.dy.abs() < f64::EPSILON
    }
}

fn axis_adjustment(edges: [f64; 2], grid: f64, threshold: f64) -> f64 {
    edges
        .iter()
        .map(|&edge| nearest_grid_line(edge, grid) - edge)
        .filter(|delta| delta.abs() < threshold)
        .min_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0)
}

/// Smallest per-axis delta aligning an edge of the frame's bounding box to the grid.
///
/// Each axis is solved independently: of the two edges on that axis, the one
/// closest to a grid line wins, but only if it is strictly closer than
/// `threshold`. Otherwise that axis stays at zero.
#[must_use]
pub fn snap_adjustment(frame: &Frame, grid: f64, threshold: f64) -> SnapAdjustment {
    if grid <= 0.0 {
        return SnapAdjustment::NONE;
    }
    let bounds = bounding_rect(frame);
    SnapAdjustment {
        dx: axis_adjustment([bounds.x, bounds.right()], grid, threshold),
        dy: axis_adjustment([bounds.y, bounds.bottom()], grid, threshold),
    }
}

/// Snap each coordinate of a point to its nearest grid line if within `threshold`.
#[must_use]
pub fn snap_point_within(p: Point, grid: f64, threshold: f64) -> Point {
    let snap = |v: f64| {
        let line = nearest_grid_line(v, grid);
        if (line - v).abs() < threshold {
            line
        } else {
            v
        }
    };
    Point::new(snap(p.x), snap(p.y))
}

/// One of the eight resize grips around a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    /// Top edge midpoint.
    N,
    /// Top-right corner.
    NE,
    /// Right edge midpoint.
    E,
    /// Bottom-right corner.
    SE,
    /// Bottom edge midpoint.
    S,
    /// Bottom-left corner.
    SW,
    /// Left edge midpoint.
    W,
    /// Top-left corner.
    NW,
}

impl ResizeHandle {
    /// Every handle, corners first so they win hit-tests against edges.
    pub const ALL: [Self; 8] = [
        Self::NW,
        Self::NE,
        Self::SE,
        Self::SW,
        Self::N,
        Self::E,
        Self::S,
        Self::W,
    ];

    /// Direction of the handle from the layer centre, as `-1`, `0` or `1` per axis.
    #[must_use]
    pub const fn signs(self) -> (f64, f64) {
        match self {
            Self::N => (0.0, -1.0),
            Self::NE => (1.0, -1.0),
            Self::E => (1.0, 0.0),
            Self::SE => (1.0, 1.0),
            Self::S => (0.0, 1.0),
            Self::SW => (-1.0, 1.0),
            Self::W => (-1.0, 0.0),
            Self::NW => (-1.0, -1.0),
        }
    }

    /// Whether this handle moves both axes.
    #[must_use]
    pub const fn is_corner(self) -> bool {
        matches!(self, Self::NE | Self::SE | Self::SW | Self::NW)
    }

    /// Position of the handle in local space for a frame of the given size.
    #[must_use]
    pub fn local_position(self, width: f64, height: f64) -> Point {
        let (sx, sy) = self.signs();
        Point::new(sx * width / 2.0, sy * height / 2.0)
    }
}

/// Resize `start` by dragging `handle` to `pointer` (world space).
///
/// The point opposite the handle stays fixed in world space, even when the
/// frame is rotated. With `keep_aspect`, the axis with the larger relative
/// change drives and the other follows the aspect ratio `start` had when the
/// gesture began. Both sides are clamped to [`MIN_LAYER_SIZE`].
#[must_use]
pub fn resize_frame(start: &Frame, handle: ResizeHandle, pointer: Point, keep_aspect: bool) -> Frame {
    let (sx, sy) = handle.signs();
    let anchor = local_to_world(
        Point::new(-sx * start.width / 2.0, -sy * start.height / 2.0),
        start,
    );
    let along_axes = rotate(
        Point::new(pointer.x - anchor.x, pointer.y - anchor.y),
        -start.rotation,
    );

    let requested_width = if sx == 0.0 {
        start.width
    } else {
        along_axes.x * sx
    };
    let requested_height = if sy == 0.0 {
        start.height
    } else {
        along_axes.y * sy
    };

    let (width, height) = if keep_aspect {
        locked_size(start, requested_width, requested_height, sx, sy)
    } else {
        (
            requested_width.max(MIN_LAYER_SIZE),
            requested_height.max(MIN_LAYER_SIZE),
        )
    };

    let anchor_offset = rotate(
        Point::new(-sx * width / 2.0, -sy * height / 2.0),
        start.rotation,
    );
    let center = Point::new(anchor.x - anchor_offset.x, anchor.y - anchor_offset.y);
    Frame::from_center(center, width, height, start.rotation)
}

fn locked_size(start: &Frame, width: f64, height: f64, sx: f64, sy: f64) -> (f64, f64) {
    let scale_x = width / start.width;
    let scale_y = height / start.height;
    let scale = if sx == 0.0 {
        scale_y
    } else if sy == 0.0 {
        scale_x
    } else {
        scale_x.max(scale_y)
    };
    let min_scale = (MIN_LAYER_SIZE / start.width).max(MIN_LAYER_SIZE / start.height);
    let scale = scale.max(min_scale);
    (start.width * scale, start.height * scale)
}

/// Scale a frame about its centre to the given size, respecting the size floor.
#[must_use]
pub fn scale_about_center(frame: &Frame, width: f64, height: f64) -> Frame {
    Frame::from_center(
        frame.center(),
        width.max(MIN_LAYER_SIZE),
        height.max(MIN_LAYER_SIZE),
        frame.rotation,
    )
}

/// Scale both sides of a frame about its centre by `factor`.
///
/// The factor is raised just enough that neither side drops below
/// [`MIN_LAYER_SIZE`], so the aspect ratio always survives.
#[must_use]
pub fn scale_uniform(frame: &Frame, factor: f64) -> Frame {
    let min_factor = (MIN_LAYER_SIZE / frame.width).max(MIN_LAYER_SIZE / frame.height);
    let factor = factor.max(min_factor);
    Frame::from_center(
        frame.center(),
        frame.width * factor,
        frame.height * factor,
        frame.rotation,
    )
}

/// Rotation after the pointer moved from `start_pointer` to `pointer` around `center`.
#[must_use]
pub fn rotation_from_pointer(
    start_rotation: f64,
    center: Point,
    start_pointer: Point,
    pointer: Point,
) -> f64 {
    let from = (start_pointer.y - center.y).atan2(start_pointer.x - center.x);
    let to = (pointer.y - center.y).atan2(pointer.x - center.x);
    start_rotation + (to - from).to_degrees()
}

/// Round an angle to the nearest multiple of `step` degrees.
#[must_use]
pub fn snap_angle(angle: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return angle;
    }
    (angle / step).round() * step
}

/// Map any angle into `[0, 360)` for display.
#[must_use]
pub fn normalize_degrees(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Direction of a stepped change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Toward larger values.
    Up,
    /// Toward smaller values.
    Down,
}

/// Next grid multiple strictly above or below `value`.
///
/// Stepping up never lands below one grid step. Stepping down never goes
/// below one grid step and never grows: a value at or under one step is
/// returned unchanged.
///
/// `grid_step(130.0, 64.0, Down) == 128.0`, `grid_step(128.0, 64.0, Down) == 64.0`,
/// `grid_step(30.0, 64.0, Down) == 30.0`, `grid_step(130.0, 64.0, Up) == 192.0`.
#[must_use]
pub fn grid_step(value: f64, grid: f64, direction: StepDirection) -> f64 {
    let base = snap_to_grid(value, grid);
    match direction {
        StepDirection::Up => (base + grid).max(grid),
        StepDirection::Down => {
            let target = if (value - base).abs() < EPSILON {
                base - grid
            } else {
                base
            };
            if target < grid {
                value
            } else {
                target
            }
        }
    }
}

/// Next multiple of `step` degrees strictly past `angle` in the given direction.
#[must_use]
pub fn angle_step(angle: f64, step: f64, direction: StepDirection) -> f64 {
    match direction {
        StepDirection::Up => (angle / step).floor() * step + step,
        StepDirection::Down => (angle / step).ceil() * step - step,
    }
}

/// Pan/zoom state of the host view.
///
/// `x, y` are the world coordinates shown at the screen origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// World x at the left edge of the screen.
    pub x: f64,
    /// World y at the top edge of the screen.
    pub y: f64,
    /// Screen pixels per world unit.
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    /// Convert a screen position to world coordinates.
    #[must_use]
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(screen.x / self.zoom + self.x, screen.y / self.zoom + self.y)
    }

    /// Convert a world position to screen coordinates.
    #[must_use]
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new((world.x - self.x) * self.zoom, (world.y - self.y) * self.zoom)
    }

    /// Pan by a screen-space distance (content follows the pointer).
    pub fn pan_by(&mut self, screen_dx: f64, screen_dy: f64) {
        self.x -= screen_dx / self.zoom;
        self.y -= screen_dy / self.zoom;
    }

    /// Multiply zoom by `factor`, keeping the world point under `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let world = self.screen_to_world(anchor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.x = world.x - anchor.x / self.zoom;
        self.y = world.y - anchor.y / self.zoom;
    }

    /// Shift the viewport in world units.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_snap_to_grid_quantizes_down() {
        assert!(approx(snap_to_grid(130.0, 64.0), 128.0));
        assert!(approx(snap_to_grid(97.0, 64.0), 64.0));
        assert!(approx(snap_to_grid(128.0, 64.0), 128.0));
        assert!(approx(snap_to_grid(-10.0, 64.0), -64.0));
        assert!(approx(snap_to_grid(42.0, 0.0), 42.0));
    }

    #[test]
    fn test_local_world_roundtrip_under_rotation() {
        let frame = Frame::new(100.0, 50.0, 200.0, 80.0, 37.0);
        let world = Point::new(180.0, 120.0);
        let back = local_to_world(world_to_local(world, &frame), &frame);
        assert!(approx(back.x, world.x));
        assert!(approx(back.y, world.y));
    }

    #[test]
    fn test_world_to_local_unrotated_is_centre_relative() {
        let frame = Frame::new(0.0, 0.0, 100.0, 50.0, 0.0);
        let local = world_to_local(Point::new(0.0, 0.0), &frame);
        assert!(approx(local.x, -50.0));
        assert!(approx(local.y, -25.0));
    }

    #[test]
    fn test_bounding_rect_of_quarter_turn() {
        let frame = Frame::new(0.0, 0.0, 100.0, 50.0, 90.0);
        let bounds = bounding_rect(&frame);
        assert!(approx(bounds.width, 50.0));
        assert!(approx(bounds.height, 100.0));
        assert!(approx(bounds.x, 25.0));
        assert!(approx(bounds.y, -25.0));
    }

    #[test]
    fn test_snap_adjustment_none_when_far() {
        // Edges at 20 and 100 on both axes: nearest lines 0 and 128 are >= 10 away.
        let frame = Frame::new(20.0, 20.0, 80.0, 80.0, 0.0);
        assert_eq!(snap_adjustment(&frame, 64.0, 10.0), SnapAdjustment::NONE);
    }

    #[test]
    fn test_snap_adjustment_moves_nearest_edge() {
        // Left edge 70 (6 from 64), right edge 170 (22 from 192).
        // Top edge 30 (34 from 64), bottom edge 125 (3 from 128).
        let frame = Frame::new(70.0, 30.0, 100.0, 95.0, 0.0);
        let adj = snap_adjustment(&frame, 64.0, 10.0);
        assert!(approx(adj.dx, -6.0));
        assert!(approx(adj.dy, 3.0));
    }

    #[test]
    fn test_snap_adjustment_prefers_smaller_delta_per_axis() {
        // Left edge 60 (+4), right edge 129 (-1): right wins.
        let frame = Frame::new(60.0, 0.0, 69.0, 64.0, 0.0);
        let adj = snap_adjustment(&frame, 64.0, 10.0);
        assert!(approx(adj.dx, -1.0));
        assert!(approx(adj.dy, 0.0));
    }

    #[test]
    fn test_resize_se_corner_unrotated() {
        let start = Frame::new(100.0, 100.0, 200.0, 100.0, 0.0);
        let out = resize_frame(&start, ResizeHandle::SE, Point::new(350.0, 260.0), false);
        assert!(approx(out.x, 100.0));
        assert!(approx(out.y, 100.0));
        assert!(approx(out.width, 250.0));
        assert!(approx(out.height, 160.0));
    }

    #[test]
    fn test_resize_nw_keeps_se_anchor() {
        let start = Frame::new(100.0, 100.0, 200.0, 100.0, 0.0);
        let out = resize_frame(&start, ResizeHandle::NW, Point::new(50.0, 80.0), false);
        assert!(approx(out.x + out.width, 300.0));
        assert!(approx(out.y + out.height, 200.0));
        assert!(approx(out.width, 250.0));
        assert!(approx(out.height, 120.0));
    }

    #[test]
    fn test_resize_edge_handle_keeps_other_axis() {
        let start = Frame::new(0.0, 0.0, 100.0, 100.0, 0.0);
        let out = resize_frame(&start, ResizeHandle::E, Point::new(180.0, 500.0), false);
        assert!(approx(out.width, 180.0));
        assert!(approx(out.height, 100.0));
        assert!(approx(out.y, 0.0));
    }

    #[test]
    fn test_resize_clamps_to_floor() {
        let start = Frame::new(0.0, 0.0, 100.0, 100.0, 0.0);
        let out = resize_frame(&start, ResizeHandle::SE, Point::new(-300.0, -300.0), false);
        assert!(approx(out.width, MIN_LAYER_SIZE));
        assert!(approx(out.height, MIN_LAYER_SIZE));
        assert!(approx(out.x, 0.0));
        assert!(approx(out.y, 0.0));
    }

    #[test]
    fn test_resize_aspect_lock_preserves_ratio() {
        let start = Frame::new(0.0, 0.0, 200.0, 100.0, 0.0);
        let out = resize_frame(&start, ResizeHandle::SE, Point::new(300.0, 110.0), true);
        assert!(approx(out.width / out.height, 2.0));
        assert!(approx(out.width, 300.0));
    }

    #[test]
    fn test_resize_rotated_anchor_stays_fixed() {
        let start = Frame::new(100.0, 100.0, 200.0, 100.0, 45.0);
        let anchor_before = local_to_world(Point::new(-100.0, -50.0), &start);
        let pointer = local_to_world(Point::new(150.0, 90.0), &start);
        let out = resize_frame(&start, ResizeHandle::SE, pointer, false);
        let anchor_after = local_to_world(
            Point::new(-out.width / 2.0, -out.height / 2.0),
            &out,
        );
        assert!(approx(anchor_before.x, anchor_after.x));
        assert!(approx(anchor_before.y, anchor_after.y));
        assert!(approx(out.width, 250.0));
        assert!(approx(out.height, 140.0));
    }

    #[test]
    fn test_scale_uniform_keeps_centre_and_ratio() {
        let frame = Frame::new(0.0, 0.0, 200.0, 130.0, 0.0);
        let out = scale_uniform(&frame, 128.0 / 130.0);
        assert!(approx(out.height, 128.0));
        assert!(approx(out.width / out.height, 200.0 / 130.0));
        assert!(approx(out.center().x, 100.0));
        assert!(approx(out.center().y, 65.0));

        let tiny = scale_uniform(&frame, 0.001);
        assert!(approx(tiny.height, MIN_LAYER_SIZE));
        assert!(tiny.width >= MIN_LAYER_SIZE);
    }

    #[test]
    fn test_rotation_from_pointer_quarter_turn() {
        let center = Point::new(0.0, 0.0);
        let r = rotation_from_pointer(10.0, center, Point::new(10.0, 0.0), Point::new(0.0, 10.0));
        assert!(approx(r, 100.0));
    }

    #[test]
    fn test_snap_angle_fifteen() {
        assert!(approx(snap_angle(92.0, 15.0), 90.0));
        assert!(approx(snap_angle(98.0, 15.0), 105.0));
        assert!(approx(snap_angle(-8.0, 15.0), -15.0));
    }

    #[test]
    fn test_normalize_degrees() {
        assert!(approx(normalize_degrees(-90.0), 270.0));
        assert!(approx(normalize_degrees(720.0), 0.0));
    }

    #[test]
    fn test_grid_step_down_and_up() {
        assert!(approx(grid_step(130.0, 64.0, StepDirection::Down), 128.0));
        assert!(approx(grid_step(128.0, 64.0, StepDirection::Down), 64.0));
        assert!(approx(grid_step(64.0, 64.0, StepDirection::Down), 64.0));
        assert!(approx(grid_step(30.0, 64.0, StepDirection::Down), 30.0));
        assert!(approx(grid_step(100.0, 64.0, StepDirection::Down), 64.0));
        assert!(approx(grid_step(30.0, 64.0, StepDirection::Up), 64.0));
        assert!(approx(grid_step(130.0, 64.0, StepDirection::Up), 192.0));
        assert!(approx(grid_step(128.0, 64.0, StepDirection::Up), 192.0));
    }

    #[test]
    fn test_angle_step() {
        assert!(approx(angle_step(12.0, 5.0, StepDirection::Up), 15.0));
        assert!(approx(angle_step(15.0, 5.0, StepDirection::Up), 20.0));
        assert!(approx(angle_step(12.0, 5.0, StepDirection::Down), 10.0));
        assert!(approx(angle_step(10.0, 5.0, StepDirection::Down), 5.0));
        assert!(approx(angle_step(-3.0, 5.0, StepDirection::Down), -5.0));
    }

    #[test]
    fn test_viewport_roundtrip_and_zoom_anchor() {
        let mut vp = Viewport {
            x: 10.0,
            y: 20.0,
            zoom: 2.0,
        };
        let screen = Point::new(300.0, 200.0);
        let world = vp.screen_to_world(screen);
        let back = vp.world_to_screen(world);
        assert!(approx(back.x, screen.x));
        assert!(approx(back.y, screen.y));

        vp.zoom_at(screen, 1.5);
        let after = vp.screen_to_world(screen);
        assert!(approx(after.x, world.x));
        assert!(approx(after.y, world.y));
    }

    #[test]
    fn test_viewport_zoom_clamped() {
        let mut vp = Viewport::default();
        vp.zoom_at(Point::default(), 1000.0);
        assert!(approx(vp.zoom, MAX_ZOOM));
        vp.zoom_at(Point::default(), 1e-6);
        assert!(approx(vp.zoom, MIN_ZOOM));
    }

    #[test]
    fn test_viewport_pan_follows_pointer() {
        let mut vp = Viewport {
            x: 0.0,
            y: 0.0,
            zoom: 2.0,
        };
        vp.pan_by(20.0, -10.0);
        assert!(approx(vp.x, -10.0));
        assert!(approx(vp.y, 5.0));
    }
}
