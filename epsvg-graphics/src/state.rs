//! The graphics state stack and its drawing operations.
//!
//! Every coordinate-taking operation transforms its arguments through the
//! current transform matrix *before* recording them, so the path stack holds
//! output-space geometry only. The state stack is mutated exclusively by the
//! interpreter thread; there is no interior sharing between states (`gsave`
//! duplicates the full state, so drawing after a `gsave` can never alter
//! what the saved state recorded).

use kurbo::{Affine, Point};

use crate::error::GraphicsError;
use crate::path::{PaintCall, PaintKind, Path, PathOp, SubPath};
use crate::types::{Color, ColorSpace, DashPattern, LineCap, LineJoin, Scalar};

/// The device output matrix reported by `defaultmatrix`.
pub const DEFAULT_OUTPUT_MATRIX: Affine = Affine::IDENTITY;

/// Invert a matrix, reporting singular matrices instead of producing NaNs.
pub fn invert(m: Affine) -> Result<Affine, GraphicsError> {
    if m.determinant().abs() < 1e-12 {
        return Err(GraphicsError::SingularMatrix);
    }
    Ok(m.inverse())
}

/// Drop the translation component of a matrix (for `dtransform`).
#[must_use]
pub fn linear_part(m: Affine) -> Affine {
    let [a, b, c, d, _, _] = m.as_coeffs();
    Affine::new([a, b, c, d, 0.0, 0.0])
}

// ---------------------------------------------------------------------------
// GraphicsState
// ---------------------------------------------------------------------------

/// One entry of the graphics state stack.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    /// Current transform matrix (user space → output space).
    pub ctm: Affine,
    /// Current point, in output space.
    pub position: Point,
    pub color_space: ColorSpace,
    pub color: Color,
    pub line_width: Scalar,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: Scalar,
    pub dash: Option<DashPattern>,
    pub flatness: Scalar,
    /// Paths recorded under this state, most recent last.
    pub paths: Vec<Path>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Affine::IDENTITY,
            position: Point::ZERO,
            color_space: ColorSpace::DeviceGray,
            color: Color::BLACK,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: None,
            flatness: 1.0,
            paths: Vec::new(),
        }
    }
}

impl GraphicsState {
    /// The path currently being drawn into, creating it on first use.
    fn active_path(&mut self) -> &mut Path {
        if self.paths.is_empty() {
            self.paths.push(Path::new());
        }
        self.paths.last_mut().expect("just ensured non-empty")
    }

    /// The sub-path currently being drawn into, opening one at the current
    /// point if none exists.
    fn active_sub_path(&mut self) -> &mut SubPath {
        let position = self.position;
        let path = self.active_path();
        if path.sub_paths.is_empty() {
            path.sub_paths.push(SubPath::starting_at(position));
        }
        path.active_sub_path_mut().expect("just ensured non-empty")
    }
}

// ---------------------------------------------------------------------------
// GraphicsStack
// ---------------------------------------------------------------------------

/// The stack of graphics states. Always holds at least the base state.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsStack {
    states: Vec<GraphicsState>,
}

impl Default for GraphicsStack {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsStack {
    /// A fresh stack with one identity-transform state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: vec![GraphicsState::default()],
        }
    }

    /// The active (topmost) graphics state.
    #[must_use]
    pub fn current(&self) -> &GraphicsState {
        self.states.last().expect("state stack never empty")
    }

    /// Mutable access to the active graphics state.
    pub fn current_mut(&mut self) -> &mut GraphicsState {
        self.states.last_mut().expect("state stack never empty")
    }

    /// Current stack depth (1 = only the base state).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    /// Replace the whole state stack (used by `restore`).
    pub fn replace(&mut self, states: Vec<GraphicsState>) {
        debug_assert!(!states.is_empty());
        self.states = states;
    }

    /// Snapshot the whole state stack (used by `save`).
    #[must_use]
    pub fn snapshot(&self) -> Vec<GraphicsState> {
        self.states.clone()
    }

    // -- state stack --

    /// `gsave`: duplicate the current state and push the copy.
    pub fn gsave(&mut self) {
        let copy = self.current().clone();
        self.states.push(copy);
    }

    /// `grestore`: pop the current state; the base state cannot be popped.
    pub fn grestore(&mut self) -> Result<(), GraphicsError> {
        if self.states.len() <= 1 {
            return Err(GraphicsError::StateStackUnderflow);
        }
        self.states.pop();
        Ok(())
    }

    // -- path construction --

    /// `newpath`: push a fresh empty path.
    pub fn new_path(&mut self) {
        self.current_mut().paths.push(Path::new());
    }

    /// `moveto`: transform the point and open or restart a sub-path.
    ///
    /// Consecutive bare moves collapse: a sub-path holding exactly one
    /// operation that is itself a move is overwritten in place.
    pub fn move_to(&mut self, x: Scalar, y: Scalar) {
        let state = self.current_mut();
        let p = state.ctm * Point::new(x, y);
        let path = state.active_path();
        let collapses = match path.active_sub_path() {
            Some(sp) => {
                sp.ops.is_empty()
                    || (sp.ops.len() == 1 && matches!(sp.ops[0], PathOp::MoveTo(_)))
            }
            None => false,
        };
        if collapses {
            if let Some(sp) = path.active_sub_path_mut() {
                sp.ops.clear();
                sp.ops.push(PathOp::MoveTo(p));
            }
        } else {
            path.sub_paths.push(SubPath::starting_at(p));
        }
        state.position = p;
    }

    /// `lineto`: transform and append a straight segment.
    pub fn line_to(&mut self, x: Scalar, y: Scalar) {
        let state = self.current_mut();
        let p = state.ctm * Point::new(x, y);
        state.active_sub_path().ops.push(PathOp::LineTo(p));
        state.position = p;
    }

    /// `curveto`: transform all three control points and append a cubic
    /// segment. The current point becomes the final control point.
    pub fn curve_to(
        &mut self,
        x1: Scalar,
        y1: Scalar,
        x2: Scalar,
        y2: Scalar,
        x3: Scalar,
        y3: Scalar,
    ) {
        let state = self.current_mut();
        let c1 = state.ctm * Point::new(x1, y1);
        let c2 = state.ctm * Point::new(x2, y2);
        let p = state.ctm * Point::new(x3, y3);
        state.active_sub_path().ops.push(PathOp::CurveTo(c1, c2, p));
        state.position = p;
    }

    /// `closepath`: append a close marker unless the sub-path already ends
    /// with one. The current point returns to the sub-path start.
    pub fn close_path(&mut self) {
        let state = self.current_mut();
        let position = state.position;
        let path = state.active_path();
        let Some(sp) = path.active_sub_path_mut() else {
            return;
        };
        if sp.is_closed() {
            return;
        }
        sp.ops.push(PathOp::Close);
        let start = sp
            .ops
            .first()
            .and_then(PathOp::endpoint)
            .unwrap_or(position);
        state.position = start;
    }

    // -- painting --

    /// `fill`: nonzero-winding fill of the current sub-paths.
    pub fn fill(&mut self) {
        self.paint_filled(PaintKind::Fill);
    }

    /// `eofill`: even-odd fill of the current sub-paths.
    pub fn eofill(&mut self) {
        self.paint_filled(PaintKind::EvenOddFill);
    }

    /// Fill-family paint: auto-close the active sub-path, snapshot the
    /// sub-paths into a paint call, then open a fresh sub-path at the last
    /// current point so later drawing continues the same logical path.
    fn paint_filled(&mut self, kind: PaintKind) {
        let state = self.current_mut();
        let position = state.position;
        let path = state.active_path();

        if let Some(sp) = path.active_sub_path_mut() {
            if !sp.is_closed() {
                sp.ops.push(PathOp::Close);
            }
        }
        path.paint_calls.push(PaintCall {
            kind,
            sub_paths: path.sub_paths.clone(),
        });
        path.sub_paths.push(SubPath::starting_at(position));
    }

    /// `stroke`: record a stroke paint call over the current sub-paths.
    ///
    /// No auto-close (an open stroke stays open) and no fresh sub-path. The
    /// renderer does not rasterize stroke calls; it reports them as
    /// unsupported.
    pub fn stroke(&mut self) {
        let path = self.current_mut().active_path();
        path.paint_calls.push(PaintCall {
            kind: PaintKind::Stroke,
            sub_paths: path.sub_paths.clone(),
        });
    }

    /// `clip`: intersecting the clip region is not rendered; acknowledged no-op.
    pub fn clip(&mut self) {
        log::warn!("clip: clipping regions are not rendered");
    }

    /// `eoclip`: acknowledged no-op, same as [`Self::clip`].
    pub fn eoclip(&mut self) {
        log::warn!("eoclip: clipping regions are not rendered");
    }

    // -- color --

    /// `setrgbcolor`: clamp the channels and select the RGB space.
    pub fn set_rgb_color(&mut self, r: Scalar, g: Scalar, b: Scalar) {
        let state = self.current_mut();
        state.color_space = ColorSpace::DeviceRgb;
        state.color = Color::clamped(r, g, b);
    }

    /// `setgray`: clamp the level and select the gray space.
    pub fn set_gray(&mut self, v: Scalar) {
        let state = self.current_mut();
        state.color_space = ColorSpace::DeviceGray;
        state.color = Color::gray(v);
    }

    /// `currentgray`: the gray level of the current color.
    ///
    /// RGB converts via the unweighted channel average. CMYK has no
    /// conversion path in the supported subset.
    pub fn current_gray(&self) -> Result<Scalar, GraphicsError> {
        let state = self.current();
        match state.color_space {
            ColorSpace::DeviceGray => Ok(state.color.r),
            ColorSpace::DeviceRgb => {
                let c = state.color;
                Ok((c.r + c.g + c.b) / 3.0)
            }
            ColorSpace::DeviceCmyk => Err(GraphicsError::UnsupportedColorSpace("currentgray")),
        }
    }

    // -- line style --

    pub fn set_line_width(&mut self, width: Scalar) {
        self.current_mut().line_width = width;
    }

    pub fn set_line_cap(&mut self, code: i64) -> Result<(), GraphicsError> {
        self.current_mut().line_cap = LineCap::from_code(code)
            .ok_or(GraphicsError::InvalidStyleCode("line cap", code))?;
        Ok(())
    }

    pub fn set_line_join(&mut self, code: i64) -> Result<(), GraphicsError> {
        self.current_mut().line_join = LineJoin::from_code(code)
            .ok_or(GraphicsError::InvalidStyleCode("line join", code))?;
        Ok(())
    }

    pub fn set_miter_limit(&mut self, limit: Scalar) {
        self.current_mut().miter_limit = limit;
    }

    pub fn set_dash(&mut self, dash: DashPattern) {
        self.current_mut().dash = if dash.dashes.is_empty() {
            None
        } else {
            Some(dash)
        };
    }

    pub fn set_flat(&mut self, flatness: Scalar) {
        self.current_mut().flatness = flatness;
    }

    #[must_use]
    pub fn current_flat(&self) -> Scalar {
        self.current().flatness
    }

    // -- transforms --

    /// `concat`: prepend a matrix to the CTM (the supplied matrix applies
    /// first, then the old CTM).
    pub fn concat(&mut self, m: Affine) {
        let state = self.current_mut();
        state.ctm = state.ctm * m;
    }

    /// `setmatrix`: replace the CTM outright.
    pub fn set_matrix(&mut self, m: Affine) {
        self.current_mut().ctm = m;
    }

    /// `translate` applied to the CTM.
    pub fn translate(&mut self, tx: Scalar, ty: Scalar) {
        self.concat(Affine::translate((tx, ty)));
    }

    /// `rotate` applied to the CTM (angle in degrees).
    pub fn rotate(&mut self, degrees: Scalar) {
        self.concat(Affine::rotate(degrees.to_radians()));
    }

    /// `scale` applied to the CTM.
    pub fn scale(&mut self, sx: Scalar, sy: Scalar) {
        self.concat(Affine::scale_non_uniform(sx, sy));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
