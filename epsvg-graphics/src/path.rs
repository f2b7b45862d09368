//! Path geometry recorded by the graphics state engine.
//!
//! A [`Path`] is a stack of [`SubPath`]s (each a run of connected drawing
//! operations) plus a log of [`PaintCall`]s. Every coordinate stored here is
//! in *output* space: the current transform matrix was applied by the engine
//! before the operation was recorded.

use kurbo::Point;

// ---------------------------------------------------------------------------
// Drawing operations
// ---------------------------------------------------------------------------

/// A single recorded drawing operation, in output coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathOp {
    /// Begin (or restart) a sub-path at a point.
    MoveTo(Point),
    /// Straight segment to a point.
    LineTo(Point),
    /// Cubic Bezier segment: two control points, then the endpoint.
    CurveTo(Point, Point, Point),
    /// Close the sub-path back to its starting point.
    Close,
}

impl PathOp {
    /// The point the pen ends up at after this operation, if any.
    ///
    /// `Close` has no endpoint of its own (the pen returns to the sub-path
    /// start, which the engine tracks separately).
    #[must_use]
    pub const fn endpoint(&self) -> Option<Point> {
        match self {
            Self::MoveTo(p) | Self::LineTo(p) | Self::CurveTo(_, _, p) => Some(*p),
            Self::Close => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SubPath
// ---------------------------------------------------------------------------

/// A contiguous run of connected drawing operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubPath {
    /// Operations in recorded order. The first is normally a `MoveTo`.
    pub ops: Vec<PathOp>,
}

impl SubPath {
    /// A sub-path starting with a move to `p`.
    #[must_use]
    pub fn starting_at(p: Point) -> Self {
        Self {
            ops: vec![PathOp::MoveTo(p)],
        }
    }

    /// Whether the last recorded operation is a `Close`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.ops.last(), Some(PathOp::Close))
    }
}

// ---------------------------------------------------------------------------
// Paint calls
// ---------------------------------------------------------------------------

/// How a paint call renders the sub-paths it captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintKind {
    /// Nonzero-winding fill.
    Fill,
    /// Even-odd fill.
    EvenOddFill,
    /// Stroke along the sub-paths. Recorded but not rendered (the stroke
    /// rendering pipeline is outside the supported subset).
    Stroke,
}

/// A recorded instruction to render a snapshot of the path.
///
/// The snapshot is taken at paint time, so later drawing cannot alter what
/// an earlier paint call will render.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintCall {
    pub kind: PaintKind,
    /// The sub-paths that existed when the paint operator ran.
    pub sub_paths: Vec<SubPath>,
}

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// A stack of sub-paths plus the log of paint calls made against them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub sub_paths: Vec<SubPath>,
    pub paint_calls: Vec<PaintCall>,
}

impl Path {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The sub-path currently being drawn into, if any.
    #[must_use]
    pub fn active_sub_path(&self) -> Option<&SubPath> {
        self.sub_paths.last()
    }

    pub(crate) fn active_sub_path_mut(&mut self) -> Option<&mut SubPath> {
        self.sub_paths.last_mut()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_of_ops() {
        let p = Point::new(3.0, 4.0);
        assert_eq!(PathOp::MoveTo(p).endpoint(), Some(p));
        assert_eq!(PathOp::LineTo(p).endpoint(), Some(p));
        assert_eq!(
            PathOp::CurveTo(Point::ZERO, Point::ZERO, p).endpoint(),
            Some(p)
        );
        assert_eq!(PathOp::Close.endpoint(), None);
    }

    #[test]
    fn sub_path_close_detection() {
        let mut sp = SubPath::starting_at(Point::ZERO);
        assert!(!sp.is_closed());
        sp.ops.push(PathOp::LineTo(Point::new(1.0, 0.0)));
        assert!(!sp.is_closed());
        sp.ops.push(PathOp::Close);
        assert!(sp.is_closed());
    }

    #[test]
    fn active_sub_path_is_last() {
        let mut path = Path::new();
        assert!(path.active_sub_path().is_none());
        path.sub_paths.push(SubPath::starting_at(Point::ZERO));
        path.sub_paths
            .push(SubPath::starting_at(Point::new(5.0, 5.0)));
        let active = path.active_sub_path().unwrap();
        assert_eq!(active.ops[0], PathOp::MoveTo(Point::new(5.0, 5.0)));
    }
}
