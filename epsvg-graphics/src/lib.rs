//! Graphics state engine for the EPSVG interpreter.
//!
//! Records path geometry (in already-transformed output coordinates) and
//! paint calls as the interpreter executes PostScript drawing operators.
//! The finished path stack is consumed by the SVG renderer.

pub mod bbox;
pub mod error;
pub mod path;
pub mod state;
pub mod types;
