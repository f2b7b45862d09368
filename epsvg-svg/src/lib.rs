//! SVG renderer for EPSVG path stacks.
//!
//! Converts a finished [`GraphicsState`] (the interpreter's paint-call log)
//! into an SVG [`Document`] using the `svg` crate.
//!
//! Key design points:
//! - Every coordinate in the log is already in output space; the graphics
//!   engine applied the CTM when the drawing operator ran. No transform
//!   attribute is emitted.
//! - Path data is built as raw `d` strings to preserve `f64` precision.
//! - One `<path>` element per fill-family paint call, in recorded order.
//!   Stroke paint calls are outside the rendered subset and are skipped
//!   with a warning.

use epsvg_graphics::bbox::BoundingBox;
use epsvg_graphics::path::{PaintCall, PaintKind, PathOp, SubPath};
use epsvg_graphics::state::GraphicsState;
use epsvg_graphics::types::Scalar;
use svg::Document;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render a finished [`GraphicsState`] to an SVG [`Document`].
///
/// The resulting document has a `viewbox` derived from the painted
/// geometry's bounding box (with a small margin).
#[must_use]
pub fn render(state: &GraphicsState) -> Document {
    render_with_options(state, &RenderOptions::default())
}

/// Render a finished [`GraphicsState`] to an SVG string.
#[must_use]
pub fn render_to_string(state: &GraphicsState) -> String {
    render(state).to_string()
}

/// Options controlling SVG output.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Extra margin around the bounding box. Default: 1.0.
    pub margin: Scalar,
    /// Number of decimal places for coordinates. Default: 4.
    pub precision: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            margin: 1.0,
            precision: 4,
        }
    }
}

/// Render a finished [`GraphicsState`] with custom options.
#[must_use]
pub fn render_with_options(state: &GraphicsState, opts: &RenderOptions) -> Document {
    let bb = BoundingBox::of_state(state);
    let mut doc = empty_document(&bb, opts);
    for path in &state.paths {
        for call in &path.paint_calls {
            match render_paint_call(call, opts) {
                Some(element) => doc = doc.add(element),
                None => {
                    log::warn!("stroke rendering is not supported; paint call skipped");
                }
            }
        }
    }
    doc
}

// ---------------------------------------------------------------------------
// Paint calls
// ---------------------------------------------------------------------------

/// One `<path>` element per fill-family paint call; strokes are `None`.
fn render_paint_call(
    call: &PaintCall,
    opts: &RenderOptions,
) -> Option<svg::node::element::Path> {
    let fill_rule = match call.kind {
        PaintKind::Fill => None,
        PaintKind::EvenOddFill => Some("evenodd"),
        PaintKind::Stroke => return None,
    };
    let d = sub_paths_to_d(&call.sub_paths, opts.precision);
    let mut el = svg::node::element::Path::new().set("d", d);
    if let Some(rule) = fill_rule {
        el = el.set("fill-rule", rule);
    }
    Some(el)
}

// ---------------------------------------------------------------------------
// Path → SVG "d" attribute
// ---------------------------------------------------------------------------

/// Whether a sub-path contributes visible filled geometry.
fn has_drawing_ops(sp: &SubPath) -> bool {
    sp.ops
        .iter()
        .any(|op| matches!(op, PathOp::LineTo(_) | PathOp::CurveTo(..)))
}

/// Concatenate the recorded operations of every drawable sub-path into one
/// path data string: `M x y`, `L x y`, `C x1 y1 x2 y2 x3 y3`, `z`.
fn sub_paths_to_d(sub_paths: &[SubPath], precision: usize) -> String {
    use std::fmt::Write;

    let mut d = String::with_capacity(sub_paths.len() * 64);
    for sp in sub_paths {
        if !has_drawing_ops(sp) {
            continue;
        }
        for op in &sp.ops {
            match op {
                PathOp::MoveTo(p) => {
                    let _ = write!(
                        d,
                        "M {} {}",
                        fmt_scalar(p.x, precision),
                        fmt_scalar(p.y, precision)
                    );
                }
                PathOp::LineTo(p) => {
                    let _ = write!(
                        d,
                        "L {} {}",
                        fmt_scalar(p.x, precision),
                        fmt_scalar(p.y, precision)
                    );
                }
                PathOp::CurveTo(c1, c2, p) => {
                    let _ = write!(
                        d,
                        "C {} {} {} {} {} {}",
                        fmt_scalar(c1.x, precision),
                        fmt_scalar(c1.y, precision),
                        fmt_scalar(c2.x, precision),
                        fmt_scalar(c2.y, precision),
                        fmt_scalar(p.x, precision),
                        fmt_scalar(p.y, precision)
                    );
                }
                PathOp::Close => d.push('z'),
            }
        }
    }
    d
}

/// Format a scalar to the given precision, stripping trailing zeros.
fn fmt_scalar(v: Scalar, precision: usize) -> String {
    // Normalize negative zero for cleaner output.
    let v = if v == 0.0 { 0.0 } else { v };
    let s = format!("{v:.precision$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        s
    }
}

// ---------------------------------------------------------------------------
// Document assembly
// ---------------------------------------------------------------------------

/// The root `<svg>` with its `viewbox` from the painted bounding box.
fn empty_document(bb: &BoundingBox, opts: &RenderOptions) -> Document {
    let m = opts.margin;
    let (vb_x, vb_y, vb_w, vb_h) = if bb.is_empty() {
        (0.0, 0.0, 100.0, 100.0)
    } else {
        (
            bb.min_x - m,
            bb.min_y - m,
            2.0f64.mul_add(m, bb.width()),
            2.0f64.mul_add(m, bb.height()),
        )
    };
    Document::new().set(
        "viewbox",
        format!(
            "{} {} {} {}",
            fmt_scalar(vb_x, opts.precision),
            fmt_scalar(vb_y, opts.precision),
            fmt_scalar(vb_w, opts.precision),
            fmt_scalar(vb_h, opts.precision),
        ),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use epsvg_graphics::state::GraphicsStack;
    use kurbo::Point;

    use super::*;

    /// Draw a filled triangle through the graphics engine.
    fn triangle_state() -> GraphicsStack {
        let mut g = GraphicsStack::new();
        g.new_path();
        g.move_to(10.0, 10.0);
        g.line_to(20.0, 10.0);
        g.line_to(20.0, 20.0);
        g.close_path();
        g.fill();
        g
    }

    #[test]
    fn fmt_scalar_trims_trailing_zeros() {
        assert_eq!(fmt_scalar(10.0, 4), "10");
        assert_eq!(fmt_scalar(2.5, 4), "2.5");
        assert_eq!(fmt_scalar(0.12345, 4), "0.1235");
        assert_eq!(fmt_scalar(-0.0, 4), "0");
    }

    #[test]
    fn triangle_produces_expected_path_data() {
        let g = triangle_state();
        let call = &g.current().paths[0].paint_calls[0];
        let d = sub_paths_to_d(&call.sub_paths, 4);
        assert_eq!(d, "M 10 10L 20 10L 20 20z");
    }

    #[test]
    fn even_odd_fill_sets_the_rule() {
        let mut g = GraphicsStack::new();
        g.move_to(0.0, 0.0);
        g.line_to(4.0, 0.0);
        g.eofill();
        let out = render_to_string(g.current());
        assert!(out.contains("fill-rule=\"evenodd\""), "{out}");
    }

    #[test]
    fn stroke_calls_are_skipped() {
        let mut g = GraphicsStack::new();
        g.move_to(0.0, 0.0);
        g.line_to(4.0, 0.0);
        g.stroke();
        let out = render_to_string(g.current());
        assert!(!out.contains("<path"), "{out}");
    }

    #[test]
    fn degenerate_sub_paths_are_omitted() {
        let sub_paths = vec![
            SubPath::starting_at(Point::new(1.0, 1.0)),
            SubPath {
                ops: vec![
                    PathOp::MoveTo(Point::new(0.0, 0.0)),
                    PathOp::LineTo(Point::new(2.0, 0.0)),
                ],
            },
        ];
        let d = sub_paths_to_d(&sub_paths, 4);
        assert_eq!(d, "M 0 0L 2 0");
    }

    #[test]
    fn viewbox_covers_the_painted_geometry() {
        let g = triangle_state();
        let out = render_to_string(g.current());
        assert!(out.contains("viewbox=\"9 9 12 12\""), "{out}");
    }

    #[test]
    fn empty_state_still_renders_a_document() {
        let g = GraphicsStack::new();
        let out = render_to_string(g.current());
        assert!(out.contains("viewbox=\"0 0 100 100\""), "{out}");
    }

    #[test]
    fn interpreter_output_renders_end_to_end() {
        let mut machine = epsvg_core::machine::Machine::new();
        machine
            .run("newpath 10 10 moveto 20 10 lineto 20 20 lineto closepath fill")
            .unwrap();
        let out = render_to_string(machine.graphics.current());
        assert!(out.contains("d=\"M 10 10L 20 10L 20 20z\""), "{out}");
    }
}
