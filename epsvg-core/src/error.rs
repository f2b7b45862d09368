//! Error types for the EPS lexer and interpreter.

use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error produced by the lexer or the stack machine.
///
/// All kinds are fatal and abort the run; `stop` inside `stopped` is not an
/// error but a cooperative control signal (see the machine's `Control`).
#[derive(Debug, Clone)]
pub struct MachineError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Line and column of the token being processed, if known.
    pub position: Option<(u32, u32)>,
}

impl MachineError {
    /// Create a new error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
        }
    }

    /// Attach a source position (line, column), keeping an existing one.
    #[must_use]
    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        if self.position.is_none() {
            self.position = Some((line, column));
        }
        self
    }
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((line, column)) = self.position {
            write!(f, "[{line}:{column}] ")?;
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for MachineError {}

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Categories of fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No terminator or delimiter found before end of input.
    Lexical,
    /// Name not found in any active scope, the user dictionary, or the
    /// system operator table.
    UndefinedName,
    /// Operator invoked on an operand of an unsupported kind.
    TypeMismatch,
    /// Pop from an empty operand, save, or construction stack.
    StackUnderflow,
    /// Array/string/dictionary index or slice outside bounds.
    IndexOutOfRange,
    /// Explicitly stubbed feature reached a path it cannot handle.
    Unsupported,
    /// Division by zero and friends.
    Arithmetic,
    /// Procedure evaluation nested too deep.
    RecursionLimit,
    /// `exit` or `stop` escaped to the top level with no enclosing
    /// `loop`/`stopped` to consume it.
    ControlFlow,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => write!(f, "lexical error"),
            Self::UndefinedName => write!(f, "undefined name"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::IndexOutOfRange => write!(f, "index out of range"),
            Self::Unsupported => write!(f, "unsupported feature"),
            Self::Arithmetic => write!(f, "arithmetic error"),
            Self::RecursionLimit => write!(f, "recursion too deep"),
            Self::ControlFlow => write!(f, "control flow error"),
        }
    }
}

/// Convenience type alias for results using [`MachineError`].
pub type InterpResult<T> = Result<T, MachineError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
