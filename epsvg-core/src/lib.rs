//! EPS (PostScript subset) tokenizer and stack-machine interpreter.

pub mod dict;
pub mod error;
pub mod lexer;
pub mod machine;
pub mod token;
pub mod value;
