//! Core types shared across the EPSVG system.
//!
//! These define the PostScript graphics-state parameters that are not path
//! geometry: colors, line styles, and dash patterns. Geometry uses
//! `kurbo::Point` and `kurbo::Affine` directly.

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// Convenience alias. PostScript reals are nominally single-precision;
/// we use f64 throughout for compatibility with `kurbo`.
pub type Scalar = f64;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// The device color space currently selected by `setgray`/`setrgbcolor`.
///
/// CMYK exists as a tag only: no operator in the supported subset can
/// produce it, and `currentgray` treats it as a fatal stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
}

/// RGB color with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: Scalar,
    pub g: Scalar,
    pub b: Scalar,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    #[inline]
    #[must_use]
    pub const fn new(r: Scalar, g: Scalar, b: Scalar) -> Self {
        Self { r, g, b }
    }

    /// Create a color with all components clamped to [0, 1].
    #[must_use]
    pub fn clamped(r: Scalar, g: Scalar, b: Scalar) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Create a gray color (all channels equal), clamped to [0, 1].
    #[must_use]
    pub fn gray(v: Scalar) -> Self {
        let v = v.clamp(0.0, 1.0);
        Self { r: v, g: v, b: v }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

// ---------------------------------------------------------------------------
// LineCap / LineJoin
// ---------------------------------------------------------------------------

/// Stroke line-cap styles (PostScript `setlinecap` codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt = 0,
    Round = 1,
    Square = 2,
}

impl LineCap {
    /// Decode a `setlinecap` operand. Out-of-range codes are `None`.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Butt),
            1 => Some(Self::Round),
            2 => Some(Self::Square),
            _ => None,
        }
    }
}

/// Stroke line-join styles (PostScript `setlinejoin` codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

impl LineJoin {
    /// Decode a `setlinejoin` operand. Out-of-range codes are `None`.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Miter),
            1 => Some(Self::Round),
            2 => Some(Self::Bevel),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DashPattern
// ---------------------------------------------------------------------------

/// A dash pattern: alternating on/off lengths with a starting offset.
///
/// An empty `dashes` array means a solid line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashPattern {
    /// Alternating on, off, on, off, ... lengths.
    pub dashes: Vec<Scalar>,
    /// Starting offset into the pattern.
    pub offset: Scalar,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_clamping() {
        let c = Color::clamped(1.5, -0.2, 0.5);
        assert_eq!(c, Color::new(1.0, 0.0, 0.5));
    }

    #[test]
    fn gray_sets_all_channels() {
        let c = Color::gray(0.25);
        assert_eq!(c, Color::new(0.25, 0.25, 0.25));
        assert_eq!(Color::gray(2.0), Color::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn linecap_codes() {
        assert_eq!(LineCap::from_code(0), Some(LineCap::Butt));
        assert_eq!(LineCap::from_code(2), Some(LineCap::Square));
        assert_eq!(LineCap::from_code(3), None);
        assert_eq!(LineCap::from_code(-1), None);
    }

    #[test]
    fn linejoin_codes() {
        assert_eq!(LineJoin::from_code(1), Some(LineJoin::Round));
        assert_eq!(LineJoin::from_code(5), None);
    }

    #[test]
    fn default_color_space_is_gray() {
        assert_eq!(ColorSpace::default(), ColorSpace::DeviceGray);
    }
}
