//! The interpreter's tagged value union and its shared containers.
//!
//! Strings, arrays, and procedure bodies are reference-shared, mutably
//! aliased objects: copying a [`Value`] copies the handle, not the contents.
//! Arrays and strings are segment views (a shared backing buffer plus
//! start/length), so `getinterval` produces a sub-view that aliases the
//! original. The single exception to handle-copying is [`Value::deep_copy`],
//! used by `save` snapshots, which must be structurally independent of the
//! live stacks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use kurbo::Affine;

use crate::dict::SymbolDict;
use crate::error::{ErrorKind, InterpResult, MachineError};
use crate::machine::{Control, Machine};
use crate::token::Keyword;

// ---------------------------------------------------------------------------
// String segments
// ---------------------------------------------------------------------------

/// A mutable byte-string view: shared backing buffer plus start/length.
#[derive(Debug, Clone)]
pub struct StrSeg {
    backing: Rc<RefCell<Vec<u8>>>,
    start: usize,
    len: usize,
}

impl StrSeg {
    #[must_use]
    pub fn from_text(s: &str) -> Self {
        Self::from_bytes(s.as_bytes().to_vec())
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            backing: Rc::new(RefCell::new(bytes)),
            start: 0,
            len,
        }
    }

    /// A zero-filled string of the given length (the `string` operator).
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self::from_bytes(vec![0; len])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.backing.borrow()[self.start + index])
        } else {
            None
        }
    }

    /// Write one byte through the shared handle.
    pub fn set(&self, index: usize, byte: u8) -> bool {
        if index < self.len {
            self.backing.borrow_mut()[self.start + index] = byte;
            true
        } else {
            false
        }
    }

    /// A sub-view sharing the same backing buffer.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        if start.checked_add(len)? <= self.len {
            Some(Self {
                backing: Rc::clone(&self.backing),
                start: self.start + start,
                len,
            })
        } else {
            None
        }
    }

    /// Copy another segment's bytes into this one at `at` (`putinterval`).
    pub fn copy_from(&self, src: &Self, at: usize) -> bool {
        let Some(end) = at.checked_add(src.len) else {
            return false;
        };
        if end > self.len {
            return false;
        }
        let bytes = src.to_vec();
        let mut backing = self.backing.borrow_mut();
        backing[self.start + at..self.start + end].copy_from_slice(&bytes);
        true
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.backing.borrow()[self.start..self.start + self.len].to_vec()
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }

    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.len == other.len && self.to_vec() == other.to_vec()
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.len >= prefix.len && self.to_vec()[..prefix.len] == prefix.to_vec()
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self::from_bytes(self.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Array segments
// ---------------------------------------------------------------------------

/// A fixed-length mutable array view: shared backing plus start/length.
#[derive(Debug, Clone)]
pub struct ArraySeg {
    backing: Rc<RefCell<Vec<Value>>>,
    start: usize,
    len: usize,
}

impl ArraySeg {
    /// A null-filled array of the given length (the `array` operator).
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self::from_vec(vec![Value::Null; len])
    }

    #[must_use]
    pub fn from_vec(values: Vec<Value>) -> Self {
        let len = values.len();
        Self {
            backing: Rc::new(RefCell::new(values)),
            start: 0,
            len,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        if index < self.len {
            Some(self.backing.borrow()[self.start + index].clone())
        } else {
            None
        }
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        if index < self.len {
            self.backing.borrow_mut()[self.start + index] = value;
            true
        } else {
            false
        }
    }

    /// A sub-view sharing the same backing buffer.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        if start.checked_add(len)? <= self.len {
            Some(Self {
                backing: Rc::clone(&self.backing),
                start: self.start + start,
                len,
            })
        } else {
            None
        }
    }

    /// Copy another segment's elements into this one at `at`.
    pub fn copy_from(&self, src: &Self, at: usize) -> bool {
        let Some(end) = at.checked_add(src.len) else {
            return false;
        };
        if end > self.len {
            return false;
        }
        let values = src.to_vec();
        let mut backing = self.backing.borrow_mut();
        backing[self.start + at..self.start + end].clone_from_slice(&values);
        true
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.backing.borrow()[self.start..self.start + self.len].to_vec()
    }

    /// Same backing buffer and same view.
    #[must_use]
    pub fn handle_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.backing, &other.backing)
            && self.start == other.start
            && self.len == other.len
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self::from_vec(self.to_vec().iter().map(Value::deep_copy).collect())
    }
}

// ---------------------------------------------------------------------------
// Procedures and operators
// ---------------------------------------------------------------------------

/// A deferred-execution body built by `{`...`}`.
///
/// The body is shared: `bind` rewrites it in place for every holder. The
/// executable flag is set by `bind` on substituted procedures so they run
/// when encountered inside another body.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub body: Rc<RefCell<Vec<Value>>>,
    pub executable: bool,
}

impl Procedure {
    #[must_use]
    pub fn new(body: Vec<Value>) -> Self {
        Self {
            body: Rc::new(RefCell::new(body)),
            executable: false,
        }
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            body: Rc::new(RefCell::new(
                self.body.borrow().iter().map(Value::deep_copy).collect(),
            )),
            executable: self.executable,
        }
    }
}

/// The signature of every primitive operator.
pub type OpFn = fn(&mut Machine) -> InterpResult<Control>;

/// A named primitive operator.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveOp {
    pub name: &'static str,
    pub func: OpFn,
}

// ---------------------------------------------------------------------------
// Dictionaries
// ---------------------------------------------------------------------------

/// A dictionary handle: either an ordinary symbol table or the system
/// operator table.
///
/// The system table is keyed by reserved-word code; name-to-code translation
/// happens at its boundary. It is immutable after startup.
#[derive(Debug, Clone)]
pub enum Dict {
    Table(Rc<RefCell<SymbolDict<Value>>>),
    System(Rc<SystemDict>),
}

impl Dict {
    /// A fresh empty table with the given bucket capacity hint.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::Table(Rc::new(RefCell::new(SymbolDict::with_buckets(
            capacity.max(1),
        ))))
    }

    #[must_use]
    pub fn from_table(table: Rc<RefCell<SymbolDict<Value>>>) -> Self {
        Self::Table(table)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Table(table) => table.borrow().get(key).cloned(),
            Self::System(system) => system.get(key).cloned(),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::Table(table) => table.borrow().contains_key(key),
            Self::System(system) => system.get(key).is_some(),
        }
    }

    /// Insert or replace. The system table rejects writes.
    pub fn insert(&self, key: &str, value: Value) -> InterpResult<()> {
        match self {
            Self::Table(table) => {
                table.borrow_mut().insert(key, value);
                Ok(())
            }
            Self::System(_) => Err(MachineError::new(
                ErrorKind::TypeMismatch,
                "systemdict is read-only",
            )),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Table(table) => table.borrow().len(),
            Self::System(system) => system.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same underlying table.
    #[must_use]
    pub fn handle_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Table(a), Self::Table(b)) => Rc::ptr_eq(a, b),
            (Self::System(a), Self::System(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Table(table) => {
                let copy: SymbolDict<Value> = table
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.deep_copy()))
                    .collect();
                Self::Table(Rc::new(RefCell::new(copy)))
            }
            // The operator table is immutable; the handle is the copy.
            Self::System(system) => Self::System(Rc::clone(system)),
        }
    }
}

/// The immutable table of primitive operators, keyed by reserved-word code.
#[derive(Debug, Default)]
pub struct SystemDict {
    entries: HashMap<Keyword, Value>,
}

impl SystemDict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keyword: Keyword, value: Value) {
        self.entries.insert(keyword, value);
    }

    #[must_use]
    pub fn get_keyword(&self, keyword: Keyword) -> Option<&Value> {
        self.entries.get(&keyword)
    }

    /// Name-keyed lookup: translate through the reserved-word table first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.get_keyword(Keyword::lookup(name)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// The interpreter's tagged union.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(StrSeg),
    Name { name: Rc<str>, executable: bool },
    Mark,
    Array(ArraySeg),
    Procedure(Procedure),
    Dictionary(Dict),
    Matrix(Affine),
    Operator(PrimitiveOp),
    /// A font dictionary pre-seeded with the standard keys.
    Font(Dict),
    /// Index into the save stack.
    Save(usize),
}

impl Value {
    /// A name value. `executable` distinguishes `foo` from `/foo`.
    #[must_use]
    pub fn name(name: &str, executable: bool) -> Self {
        Self::Name {
            name: Rc::from(name),
            executable,
        }
    }

    /// The kind, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Name { .. } => "name",
            Self::Mark => "mark",
            Self::Array(_) => "array",
            Self::Procedure(_) => "procedure",
            Self::Dictionary(_) => "dictionary",
            Self::Matrix(_) => "matrix",
            Self::Operator(_) => "operator",
            Self::Font(_) => "font",
            Self::Save(_) => "save",
        }
    }

    /// Numeric payload as a float, for Integer and Real only.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => {
                // i64 → f64 may round huge values; page coordinates never
                // get near that range.
                #[allow(clippy::cast_precision_loss)]
                Some(*i as f64)
            }
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Real(_))
    }

    /// A structurally independent copy, for save snapshots.
    ///
    /// Shared containers are copied contents-and-all; the system operator
    /// table is the one handle-copied exception (it never mutates).
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::String(s) => Self::String(s.deep_copy()),
            Self::Array(a) => Self::Array(a.deep_copy()),
            Self::Procedure(p) => Self::Procedure(p.deep_copy()),
            Self::Dictionary(d) => Self::Dictionary(d.deep_copy()),
            Self::Font(d) => Self::Font(d.deep_copy()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "({})", s.to_text()),
            Self::Name { name, executable } => {
                if *executable {
                    write!(f, "{name}")
                } else {
                    write!(f, "/{name}")
                }
            }
            Self::Mark => write!(f, "mark"),
            Self::Array(a) => write!(f, "array[{}]", a.len()),
            Self::Procedure(p) => {
                write!(f, "{{")?;
                for value in p.body.borrow().iter() {
                    write!(f, " {value}")?;
                }
                write!(f, " }}")
            }
            Self::Dictionary(d) => write!(f, "dict[{}]", d.len()),
            Self::Matrix(m) => {
                let [a, b, c, d, e, g] = m.as_coeffs();
                write!(f, "matrix[{a} {b} {c} {d} {e} {g}]")
            }
            Self::Operator(op) => write!(f, "--{}--", op.name),
            Self::Font(d) => write!(f, "font[{}]", d.len()),
            Self::Save(index) => write!(f, "save({index})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_segment_views_alias() {
        let s = StrSeg::from_text("hello world");
        let tail = s.slice(6, 5).unwrap();
        assert_eq!(tail.to_text(), "world");
        tail.set(0, b'W');
        assert_eq!(s.to_text(), "hello World");
    }

    #[test]
    fn string_deep_copy_is_independent() {
        let s = StrSeg::from_text("abc");
        let copy = s.deep_copy();
        s.set(0, b'x');
        assert_eq!(copy.to_text(), "abc");
    }

    #[test]
    fn array_handle_copy_shares_contents() {
        let a = ArraySeg::with_len(3);
        let b = a.clone();
        b.set(1, Value::Integer(42));
        assert!(matches!(a.get(1), Some(Value::Integer(42))));
        assert!(a.handle_eq(&b));
    }

    #[test]
    fn array_slice_bounds() {
        let a = ArraySeg::with_len(5);
        assert!(a.slice(2, 3).is_some());
        assert!(a.slice(2, 4).is_none());
        assert!(a.slice(6, 0).is_none());
    }

    #[test]
    fn array_deep_copy_is_independent() {
        let a = ArraySeg::from_vec(vec![Value::Integer(1), Value::Integer(2)]);
        let copy = a.deep_copy();
        a.set(0, Value::Integer(99));
        assert!(matches!(copy.get(0), Some(Value::Integer(1))));
        assert!(!a.handle_eq(&copy));
    }

    #[test]
    fn nested_deep_copy() {
        let inner = ArraySeg::with_len(1);
        let outer = ArraySeg::from_vec(vec![Value::Array(inner.clone())]);
        let copy = outer.deep_copy();
        inner.set(0, Value::Integer(7));
        let Some(Value::Array(copied_inner)) = copy.get(0) else {
            panic!("expected array");
        };
        assert!(matches!(copied_inner.get(0), Some(Value::Null)));
    }

    #[test]
    fn dict_insert_and_get() {
        let d = Dict::with_capacity(8);
        d.insert("x", Value::Integer(1)).unwrap();
        assert!(matches!(d.get("x"), Some(Value::Integer(1))));
        assert!(d.get("y").is_none());
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn dict_deep_copy_is_independent() {
        let d = Dict::with_capacity(4);
        d.insert("k", Value::Integer(1)).unwrap();
        let copy = d.deep_copy();
        d.insert("k", Value::Integer(2)).unwrap();
        assert!(matches!(copy.get("k"), Some(Value::Integer(1))));
        assert!(!d.handle_eq(&copy));
    }

    #[test]
    fn scalar_coercion() {
        assert_eq!(Value::Integer(3).as_scalar(), Some(3.0));
        assert_eq!(Value::Real(2.5).as_scalar(), Some(2.5));
        assert_eq!(Value::Boolean(true).as_scalar(), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::name("Foo", false).to_string(), "/Foo");
        assert_eq!(Value::name("add", true).to_string(), "add");
        assert_eq!(Value::Integer(5).to_string(), "5");
        let p = Procedure::new(vec![Value::Integer(1), Value::name("add", true)]);
        assert_eq!(Value::Procedure(p).to_string(), "{ 1 add }");
    }
}
