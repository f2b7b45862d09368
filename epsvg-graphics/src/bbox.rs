//! Bounding box of recorded paint geometry.
//!
//! The renderer sizes its viewport from the geometry that was actually
//! painted, so only points captured in paint calls count; open sub-paths
//! that were never filled or stroked do not widen the box.

use kurbo::Point;

use crate::path::{PathOp, SubPath};
use crate::state::GraphicsState;

/// Axis-aligned bounding box in output coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// An empty box: any `include` replaces it entirely.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Whether no point has been included yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Grow the box to cover a point.
    pub fn include(&mut self, p: Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    /// Fold the points of a sub-path into the box. Curve control points are
    /// included, over-approximating the true curve extent.
    pub fn include_sub_path(&mut self, sp: &SubPath) {
        for op in &sp.ops {
            match op {
                PathOp::MoveTo(p) | PathOp::LineTo(p) => self.include(*p),
                PathOp::CurveTo(c1, c2, p) => {
                    self.include(*c1);
                    self.include(*c2);
                    self.include(*p);
                }
                PathOp::Close => {}
            }
        }
    }

    /// Bounding box of every painted point of a graphics state.
    #[must_use]
    pub fn of_state(state: &GraphicsState) -> Self {
        let mut bbox = Self::empty();
        for path in &state.paths {
            for call in &path.paint_calls {
                for sp in &call.sub_paths {
                    bbox.include_sub_path(sp);
                }
            }
        }
        bbox
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GraphicsStack;

    #[test]
    fn empty_box_has_zero_extent() {
        let bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        assert_eq!(bbox.width(), 0.0);
        assert_eq!(bbox.height(), 0.0);
    }

    #[test]
    fn include_grows_box() {
        let mut bbox = BoundingBox::empty();
        bbox.include(Point::new(1.0, 2.0));
        bbox.include(Point::new(-3.0, 5.0));
        assert_eq!(bbox.min_x, -3.0);
        assert_eq!(bbox.max_x, 1.0);
        assert_eq!(bbox.width(), 4.0);
        assert_eq!(bbox.height(), 3.0);
    }

    #[test]
    fn unpainted_geometry_does_not_count() {
        let mut g = GraphicsStack::new();
        g.new_path();
        g.move_to(0.0, 0.0);
        g.line_to(100.0, 100.0);
        assert!(BoundingBox::of_state(g.current()).is_empty());
        g.fill();
        let bbox = BoundingBox::of_state(g.current());
        assert_eq!(bbox.max_x, 100.0);
        assert_eq!(bbox.max_y, 100.0);
    }

    #[test]
    fn curve_control_points_included() {
        let mut g = GraphicsStack::new();
        g.new_path();
        g.move_to(0.0, 0.0);
        g.curve_to(50.0, 200.0, 60.0, -10.0, 10.0, 10.0);
        g.fill();
        let bbox = BoundingBox::of_state(g.current());
        assert_eq!(bbox.max_y, 200.0);
        assert_eq!(bbox.min_y, -10.0);
    }
}
