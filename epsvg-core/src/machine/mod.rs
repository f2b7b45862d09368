//! The stack machine.
//!
//! A [`Machine`] owns every piece of mutable interpreter state: the operand
//! stack, the dictionary scope stack, the user/status dictionaries, the
//! system operator table, the object-construction stack, the save stack, and
//! the graphics state engine. All of it is touched only by the single
//! interpreting thread; evaluation is plain call recursion with an explicit
//! depth guard.
//!
//! Control flow (`exit`/`stop`) is a per-activation signal returned from
//! evaluation and consumed by the nearest enclosing `loop`/`stopped`, not a
//! machine-wide flag, so nested constructs cannot misattribute an inner
//! signal to an outer handler.

use std::rc::Rc;

use epsvg_graphics::state::{GraphicsStack, GraphicsState};
use kurbo::Affine;

use crate::error::{ErrorKind, InterpResult, MachineError};
use crate::lexer::Lexer;
use crate::token::{Keyword, Token, TokenKind};
use crate::value::{ArraySeg, Dict, Procedure, StrSeg, SystemDict, Value};

mod operators;
#[cfg(test)]
mod tests;

/// Maximum evaluation nesting before aborting with a recursion error.
const MAX_DEPTH: usize = 256;

/// The signal returned from every evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Normal completion.
    Continue,
    /// `exit` was invoked; consumed by the nearest enclosing `loop`.
    Exit,
    /// `stop` was invoked; consumed by the nearest enclosing `stopped`.
    Stop,
}

/// An in-progress composite object, opened by `[` or `{`.
#[derive(Debug)]
enum Builder {
    Array(Vec<Value>),
    Procedure(Vec<Value>),
}

impl Builder {
    fn items_mut(&mut self) -> &mut Vec<Value> {
        match self {
            Self::Array(items) | Self::Procedure(items) => items,
        }
    }
}

/// A save point: deep copies of the operand stack and the graphics states.
#[derive(Debug)]
struct Snapshot {
    operands: Vec<Value>,
    graphics: Vec<GraphicsState>,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Machine {
    pub(crate) operands: Vec<Value>,
    /// Active `begin`'d dictionaries, innermost last.
    scope_stack: Vec<Dict>,
    user_dict: Dict,
    status_dict: Dict,
    system_dict: Rc<SystemDict>,
    builders: Vec<Builder>,
    save_stack: Vec<Snapshot>,
    /// The graphics state engine, read by the renderer after the run.
    pub graphics: GraphicsStack,
    /// Native-recursion guard across `evaluate`.
    depth: usize,
    /// Line/column of the token currently being processed.
    position: Option<(u32, u32)>,
}

impl Machine {
    #[must_use]
    pub fn new() -> Self {
        let status_dict = Dict::with_capacity(8);
        // Best effort; a fresh table never rejects inserts.
        let _ = status_dict.insert(
            "product",
            Value::String(StrSeg::from_text("epsvg")),
        );
        Self {
            operands: Vec::with_capacity(128),
            scope_stack: Vec::with_capacity(8),
            user_dict: Dict::with_capacity(32),
            status_dict,
            system_dict: Rc::new(operators::build_system_dict()),
            builders: Vec::with_capacity(8),
            save_stack: Vec::with_capacity(8),
            graphics: GraphicsStack::new(),
            depth: 0,
            position: None,
        }
    }

    /// Interpret a whole document.
    pub fn run(&mut self, src: &str) -> InterpResult<()> {
        let mut lexer = Lexer::new(src);
        loop {
            let token = lexer.next_token()?;
            if token.kind.is_eof() {
                break;
            }
            self.position = Some((token.line, token.column));
            match self
                .process_token(&token)
                .map_err(|e| e.with_position(token.line, token.column))?
            {
                Control::Continue => {}
                Control::Exit => {
                    return Err(self.error(
                        ErrorKind::ControlFlow,
                        "exit with no enclosing loop",
                    ));
                }
                Control::Stop => {
                    return Err(self.error(
                        ErrorKind::ControlFlow,
                        "stop with no enclosing stopped context",
                    ));
                }
            }
        }
        if !self.builders.is_empty() {
            return Err(self.error(
                ErrorKind::Lexical,
                "unclosed procedure or array at end of input",
            ));
        }
        Ok(())
    }

    /// The operand stack, bottom to top.
    #[must_use]
    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    // -----------------------------------------------------------------------
    // Token processing
    // -----------------------------------------------------------------------

    /// Top-level dispatch for one token.
    ///
    /// `[`/`{` open builders; a matching close pops the builder and either
    /// nests the finished object into the next builder or pushes it to the
    /// operand stack. While a builder is open every other token is appended
    /// to it as a value instead of being executed.
    fn process_token(&mut self, token: &Token<'_>) -> InterpResult<Control> {
        match token.kind {
            TokenKind::Comment | TokenKind::PageTag | TokenKind::Eof => {
                Ok(Control::Continue)
            }
            TokenKind::LeftBracket => {
                log::trace!("constructing array (depth {})", self.builders.len() + 1);
                self.builders.push(Builder::Array(Vec::with_capacity(8)));
                Ok(Control::Continue)
            }
            TokenKind::LeftBrace => {
                log::trace!(
                    "constructing procedure (depth {})",
                    self.builders.len() + 1
                );
                self.builders.push(Builder::Procedure(Vec::with_capacity(8)));
                Ok(Control::Continue)
            }
            TokenKind::RightBracket | TokenKind::RightBrace => {
                let builder = self.builders.pop().ok_or_else(|| {
                    self.error(
                        ErrorKind::StackUnderflow,
                        format!("'{}' with no open builder", token.content),
                    )
                })?;
                let finished = match (builder, token.kind) {
                    (Builder::Array(items), TokenKind::RightBracket) => {
                        Value::Array(ArraySeg::from_vec(items))
                    }
                    (Builder::Procedure(items), TokenKind::RightBrace) => {
                        Value::Procedure(Procedure::new(items))
                    }
                    (Builder::Array(_), _) => {
                        return Err(self.error(
                            ErrorKind::TypeMismatch,
                            "'}' closing an array builder",
                        ));
                    }
                    (Builder::Procedure(_), _) => {
                        return Err(self.error(
                            ErrorKind::TypeMismatch,
                            "']' closing a procedure builder",
                        ));
                    }
                };
                log::trace!("finished {finished}");
                if let Some(outer) = self.builders.last_mut() {
                    outer.items_mut().push(finished);
                } else {
                    self.operands.push(finished);
                }
                Ok(Control::Continue)
            }
            _ => {
                let value = self.token_value(token)?;
                if let Some(builder) = self.builders.last_mut() {
                    builder.items_mut().push(value);
                    Ok(Control::Continue)
                } else {
                    self.evaluate(value, 0)
                }
            }
        }
    }

    /// Convert a literal or name token to a value.
    fn token_value(&self, token: &Token<'_>) -> InterpResult<Value> {
        match token.kind {
            TokenKind::Integer(i) => Ok(Value::Integer(i)),
            TokenKind::Real(r) => Ok(Value::Real(r)),
            TokenKind::Boolean(b) => Ok(Value::Boolean(b)),
            TokenKind::Str => Ok(Value::String(StrSeg::from_text(token.content))),
            TokenKind::HexStr => Ok(Value::String(StrSeg::from_bytes(
                self.decode_hex(token.content)?,
            ))),
            TokenKind::LiteralName => Ok(Value::name(token.content, false)),
            TokenKind::Name => Ok(Value::name(token.content, true)),
            TokenKind::Keyword(kw) => Ok(Value::name(kw.name(), true)),
            _ => Err(self.error(
                ErrorKind::TypeMismatch,
                format!("'{}' is not a literal token", token.content),
            )),
        }
    }

    /// Decode a hex-string body, ignoring whitespace. An odd trailing digit
    /// is padded with zero.
    fn decode_hex(&self, content: &str) -> InterpResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(content.len() / 2);
        let mut pending: Option<u8> = None;
        for c in content.chars() {
            if c.is_ascii_whitespace() {
                continue;
            }
            let nibble = c.to_digit(16).ok_or_else(|| {
                self.error(
                    ErrorKind::Lexical,
                    format!("invalid hex digit '{c}' in hex string"),
                )
            })?;
            // to_digit(16) yields 0..=15.
            #[allow(clippy::cast_possible_truncation)]
            let nibble = nibble as u8;
            match pending.take() {
                Some(high) => bytes.push(high << 4 | nibble),
                None => pending = Some(nibble),
            }
        }
        if let Some(high) = pending {
            bytes.push(high << 4);
        }
        Ok(bytes)
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate one value.
    ///
    /// `depth` is the literalness depth: a non-executable procedure met at
    /// depth 0 runs, while one met inside a body (depth > 0) is pushed as
    /// data. Resolving an executable name restarts at depth 0, so named
    /// procedures run no matter where the name appears.
    pub(crate) fn evaluate(&mut self, value: Value, depth: usize) -> InterpResult<Control> {
        self.depth += 1;
        let result = if self.depth > MAX_DEPTH {
            Err(self.error(
                ErrorKind::RecursionLimit,
                format!("evaluation nested deeper than {MAX_DEPTH}"),
            ))
        } else {
            self.evaluate_value(value, depth)
        };
        self.depth -= 1;
        result
    }

    fn evaluate_value(&mut self, value: Value, depth: usize) -> InterpResult<Control> {
        match value {
            Value::Operator(op) => {
                log::trace!("executing '{}'", op.name);
                (op.func)(self)
            }
            Value::Name { name, executable: true } => {
                log::trace!("resolving '{name}'");
                let resolved = self.resolve(&name).ok_or_else(|| {
                    self.error(
                        ErrorKind::UndefinedName,
                        format!("'{name}' is not defined"),
                    )
                })?;
                self.evaluate(resolved, 0)
            }
            Value::Procedure(proc) if depth == 0 || proc.executable => {
                log::trace!("processing {}", Value::Procedure(proc.clone()));
                let body = proc.body.borrow().clone();
                for inner in body {
                    match self.evaluate(inner, depth + 1)? {
                        Control::Continue => {}
                        signal => return Ok(signal),
                    }
                }
                Ok(Control::Continue)
            }
            other => {
                log::trace!("pushing {other}");
                self.operands.push(other);
                Ok(Control::Continue)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Name resolution and definition
    // -----------------------------------------------------------------------

    /// Resolve a name through the scope chain: innermost active dictionary
    /// first, then the user dictionary, then the system operator table via
    /// the reserved-word code.
    #[must_use]
    pub(crate) fn resolve(&self, name: &str) -> Option<Value> {
        self.resolve_in(name).map(|(value, _)| value)
    }

    /// Like [`Self::resolve`] but also reports the owning dictionary.
    pub(crate) fn resolve_in(&self, name: &str) -> Option<(Value, Dict)> {
        for dict in self.scope_stack.iter().rev() {
            if let Some(value) = dict.get(name) {
                return Some((value, dict.clone()));
            }
        }
        if let Some(value) = self.user_dict.get(name) {
            return Some((value, self.user_dict.clone()));
        }
        let keyword = Keyword::lookup(name)?;
        let value = self.system_dict.get_keyword(keyword)?.clone();
        Some((value, Dict::System(Rc::clone(&self.system_dict))))
    }

    /// Store into the innermost active dictionary, falling back to the user
    /// dictionary when no `begin` is active.
    pub(crate) fn define(&mut self, key: &str, value: Value) -> InterpResult<()> {
        let target = self
            .scope_stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.user_dict.clone());
        target.insert(key, value).map_err(|e| {
            let position = self.position;
            match position {
                Some((l, c)) => e.with_position(l, c),
                None => e,
            }
        })
    }

    pub(crate) fn begin_scope(&mut self, dict: Dict) {
        self.scope_stack.push(dict);
    }

    pub(crate) fn end_scope(&mut self) -> InterpResult<()> {
        self.scope_stack.pop().map(|_| ()).ok_or_else(|| {
            self.error(ErrorKind::StackUnderflow, "end without matching begin")
        })
    }

    pub(crate) fn user_dict(&self) -> Dict {
        self.user_dict.clone()
    }

    pub(crate) fn status_dict(&self) -> Dict {
        self.status_dict.clone()
    }

    pub(crate) fn system_dict(&self) -> Dict {
        Dict::System(Rc::clone(&self.system_dict))
    }

    // -----------------------------------------------------------------------
    // Save points
    // -----------------------------------------------------------------------

    /// Snapshot the operand stack and graphics states; returns the index.
    pub(crate) fn push_save_point(&mut self) -> usize {
        let index = self.save_stack.len();
        self.save_stack.push(Snapshot {
            operands: self.operands.iter().map(Value::deep_copy).collect(),
            graphics: self.graphics.snapshot(),
        });
        index
    }

    /// Restore to a save point, discarding it and everything saved after.
    pub(crate) fn restore_save_point(&mut self, index: usize) -> InterpResult<()> {
        if index >= self.save_stack.len() {
            return Err(self.error(
                ErrorKind::IndexOutOfRange,
                format!("save point {index} has already been discarded"),
            ));
        }
        self.save_stack.truncate(index + 1);
        let snapshot = self.save_stack.pop().ok_or_else(|| {
            self.error(ErrorKind::StackUnderflow, "save stack is empty")
        })?;
        self.operands = snapshot.operands;
        self.graphics.replace(snapshot.graphics);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operand stack helpers
    // -----------------------------------------------------------------------

    pub(crate) fn push(&mut self, value: Value) {
        self.operands.push(value);
    }

    pub(crate) fn pop(&mut self) -> InterpResult<Value> {
        self.operands.pop().ok_or_else(|| {
            self.error(ErrorKind::StackUnderflow, "operand stack is empty")
        })
    }

    pub(crate) fn peek(&self) -> InterpResult<&Value> {
        self.operands.last().ok_or_else(|| {
            self.error(ErrorKind::StackUnderflow, "operand stack is empty")
        })
    }

    pub(crate) fn pop_scalar(&mut self) -> InterpResult<f64> {
        let value = self.pop()?;
        value.as_scalar().ok_or_else(|| self.type_error("a number", &value))
    }

    pub(crate) fn pop_int(&mut self) -> InterpResult<i64> {
        match self.pop()? {
            Value::Integer(i) => Ok(i),
            other => Err(self.type_error("an integer", &other)),
        }
    }

    /// A non-negative integer count. Negative is an index error.
    pub(crate) fn pop_count(&mut self, what: &str) -> InterpResult<usize> {
        let n = self.pop_int()?;
        usize::try_from(n).map_err(|_| {
            self.error(
                ErrorKind::IndexOutOfRange,
                format!("{what}: negative count {n}"),
            )
        })
    }

    pub(crate) fn pop_bool(&mut self) -> InterpResult<bool> {
        match self.pop()? {
            Value::Boolean(b) => Ok(b),
            other => Err(self.type_error("a boolean", &other)),
        }
    }

    /// A name operand, literal or executable.
    pub(crate) fn pop_name(&mut self) -> InterpResult<Rc<str>> {
        match self.pop()? {
            Value::Name { name, .. } => Ok(name),
            other => Err(self.type_error("a name", &other)),
        }
    }

    pub(crate) fn pop_string(&mut self) -> InterpResult<StrSeg> {
        match self.pop()? {
            Value::String(s) => Ok(s),
            other => Err(self.type_error("a string", &other)),
        }
    }

    pub(crate) fn pop_array(&mut self) -> InterpResult<ArraySeg> {
        match self.pop()? {
            Value::Array(a) => Ok(a),
            other => Err(self.type_error("an array", &other)),
        }
    }

    pub(crate) fn pop_proc(&mut self) -> InterpResult<Procedure> {
        match self.pop()? {
            Value::Procedure(p) => Ok(p),
            other => Err(self.type_error("a procedure", &other)),
        }
    }

    /// A dictionary operand; fonts count.
    pub(crate) fn pop_dict(&mut self) -> InterpResult<Dict> {
        match self.pop()? {
            Value::Dictionary(d) | Value::Font(d) => Ok(d),
            other => Err(self.type_error("a dictionary", &other)),
        }
    }

    /// A matrix operand: either a matrix value or a six-element numeric
    /// array as PostScript writes them literally.
    pub(crate) fn pop_matrix(&mut self) -> InterpResult<Affine> {
        match self.pop()? {
            Value::Matrix(m) => Ok(m),
            Value::Array(a) if a.len() == 6 => {
                let mut coeffs = [0.0; 6];
                for (i, slot) in coeffs.iter_mut().enumerate() {
                    let element = a.get(i).ok_or_else(|| {
                        self.error(ErrorKind::IndexOutOfRange, "matrix array too short")
                    })?;
                    *slot = element
                        .as_scalar()
                        .ok_or_else(|| self.type_error("a number", &element))?;
                }
                Ok(Affine::new(coeffs))
            }
            other => Err(self.type_error("a matrix", &other)),
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    pub(crate) fn error(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> MachineError {
        let err = MachineError::new(kind, message);
        match self.position {
            Some((line, column)) => err.with_position(line, column),
            None => err,
        }
    }

    pub(crate) fn type_error(&self, expected: &str, got: &Value) -> MachineError {
        self.error(
            ErrorKind::TypeMismatch,
            format!("expected {expected}, got {} ({got})", got.type_name()),
        )
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
