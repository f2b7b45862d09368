use std::fmt;

/// Errors returned by graphics state operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// `grestore` with only the base state on the stack.
    StateStackUnderflow,
    /// A matrix operation required an inverse that does not exist.
    SingularMatrix,
    /// `setlinecap`/`setlinejoin` with a code outside 0..=2.
    InvalidStyleCode(&'static str, i64),
    /// An operation reached a color-space path that is deliberately
    /// unimplemented (CMYK gray conversion).
    UnsupportedColorSpace(&'static str),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateStackUnderflow => write!(f, "grestore without matching gsave"),
            Self::SingularMatrix => write!(f, "matrix is not invertible"),
            Self::InvalidStyleCode(what, code) => {
                write!(f, "invalid {what} code {code} (expected 0, 1 or 2)")
            }
            Self::UnsupportedColorSpace(op) => {
                write!(f, "{op}: color space not supported")
            }
        }
    }
}

impl std::error::Error for GraphicsError {}
