//! The primitive operator table.
//!
//! `build_system_dict` registers one Rust function per supported reserved
//! word. Reserved words with no entry here behave like any other undefined
//! identifier at execution time, so documents can supply their own
//! definitions for them.
//!
//! Operand order follows PostScript: the last-pushed operand pops first, so
//! `x y moveto` pops `y` before `x`.

use std::cell::RefCell;
use std::rc::Rc;

use epsvg_graphics::error::GraphicsError;
use epsvg_graphics::state::{invert, linear_part, DEFAULT_OUTPUT_MATRIX};
use epsvg_graphics::types::DashPattern;
use kurbo::{Affine, Point};

use crate::dict::SymbolDict;
use crate::error::{ErrorKind, InterpResult};
use crate::machine::{Control, Machine};
use crate::token::Keyword;
use crate::value::{
    ArraySeg, Dict, OpFn, PrimitiveOp, Procedure, StrSeg, Value,
};

/// The full operator table, built once per machine.
pub(crate) fn build_system_dict() -> crate::value::SystemDict {
    let entries: &[(Keyword, OpFn)] = &[
        // stack
        (Keyword::Pop, op_pop),
        (Keyword::Dup, op_dup),
        (Keyword::Exch, op_exch),
        (Keyword::Copy, op_copy),
        (Keyword::Index, op_index),
        (Keyword::Roll, op_roll),
        (Keyword::Mark, op_mark),
        (Keyword::Clear, op_clear),
        (Keyword::Count, op_count),
        (Keyword::CountToMark, op_counttomark),
        (Keyword::ClearToMark, op_cleartomark),
        // arithmetic, comparison, logic
        (Keyword::Add, op_add),
        (Keyword::Sub, op_sub),
        (Keyword::Mul, op_mul),
        (Keyword::Div, op_div),
        (Keyword::Idiv, op_idiv),
        (Keyword::Mod, op_mod),
        (Keyword::Abs, op_abs),
        (Keyword::Neg, op_neg),
        (Keyword::Sqrt, op_sqrt),
        (Keyword::Round, op_round),
        (Keyword::Truncate, op_truncate),
        (Keyword::Cvi, op_cvi),
        (Keyword::Cvr, op_cvr),
        (Keyword::Eq, op_eq),
        (Keyword::Ne, op_ne),
        (Keyword::Lt, op_lt),
        (Keyword::Gt, op_gt),
        (Keyword::Le, op_le),
        (Keyword::Ge, op_ge),
        (Keyword::And, op_and),
        (Keyword::Or, op_or),
        (Keyword::Not, op_not),
        // containers
        (Keyword::Array, op_array),
        (Keyword::Str, op_string),
        (Keyword::Length, op_length),
        (Keyword::Get, op_get),
        (Keyword::Put, op_put),
        (Keyword::GetInterval, op_getinterval),
        (Keyword::PutInterval, op_putinterval),
        (Keyword::AStore, op_astore),
        (Keyword::ALoad, op_aload),
        (Keyword::AnchorSearch, op_anchorsearch),
        (Keyword::XCheck, op_xcheck),
        (Keyword::RCheck, op_rcheck),
        (Keyword::WCheck, op_wcheck),
        // dictionaries
        (Keyword::Dict, op_dict),
        (Keyword::Begin, op_begin),
        (Keyword::End, op_end),
        (Keyword::Def, op_def),
        (Keyword::Load, op_load),
        (Keyword::Where, op_where),
        (Keyword::Known, op_known),
        (Keyword::UserDict, op_userdict),
        (Keyword::SystemDict, op_systemdict),
        (Keyword::StatusDict, op_statusdict),
        // control flow
        (Keyword::If, op_if),
        (Keyword::IfElse, op_ifelse),
        (Keyword::Exec, op_exec),
        (Keyword::Loop, op_loop),
        (Keyword::Exit, op_exit),
        (Keyword::Stop, op_stop),
        (Keyword::Stopped, op_stopped),
        (Keyword::Bind, op_bind),
        // save/restore
        (Keyword::Save, op_save),
        (Keyword::Restore, op_restore),
        // path construction
        (Keyword::NewPath, op_newpath),
        (Keyword::MoveTo, op_moveto),
        (Keyword::LineTo, op_lineto),
        (Keyword::CurveTo, op_curveto),
        (Keyword::ClosePath, op_closepath),
        // painting
        (Keyword::Fill, op_fill),
        (Keyword::EoFill, op_eofill),
        (Keyword::Stroke, op_stroke),
        (Keyword::Clip, op_clip),
        (Keyword::EoClip, op_eoclip),
        // graphics state
        (Keyword::GSave, op_gsave),
        (Keyword::GRestore, op_grestore),
        (Keyword::SetGray, op_setgray),
        (Keyword::SetRgbColor, op_setrgbcolor),
        (Keyword::CurrentGray, op_currentgray),
        (Keyword::SetLineWidth, op_setlinewidth),
        (Keyword::SetLineCap, op_setlinecap),
        (Keyword::SetLineJoin, op_setlinejoin),
        (Keyword::SetMiterLimit, op_setmiterlimit),
        (Keyword::SetDash, op_setdash),
        (Keyword::SetFlat, op_setflat),
        (Keyword::CurrentFlat, op_currentflat),
        (Keyword::SetTransfer, op_settransfer),
        (Keyword::CurrentTransfer, op_currenttransfer),
        // matrices
        (Keyword::Matrix, op_matrix),
        (Keyword::SetMatrix, op_setmatrix),
        (Keyword::CurrentMatrix, op_currentmatrix),
        (Keyword::DefaultMatrix, op_defaultmatrix),
        (Keyword::InvertMatrix, op_invertmatrix),
        (Keyword::Transform, op_transform),
        (Keyword::ITransform, op_itransform),
        (Keyword::DTransform, op_dtransform),
        (Keyword::Translate, op_translate),
        (Keyword::Rotate, op_rotate),
        (Keyword::Scale, op_scale),
        (Keyword::Concat, op_concat),
        // misc
        (Keyword::FindFont, op_findfont),
        (Keyword::Null, op_null),
        (Keyword::Version, op_version),
    ];

    let mut dict = crate::value::SystemDict::new();
    for &(kw, func) in entries {
        dict.insert(
            kw,
            Value::Operator(PrimitiveOp {
                name: kw.name(),
                func,
            }),
        );
    }
    dict
}

fn graphics_error(m: &Machine, err: GraphicsError) -> crate::error::MachineError {
    let kind = match err {
        GraphicsError::StateStackUnderflow => ErrorKind::StackUnderflow,
        GraphicsError::SingularMatrix => ErrorKind::Arithmetic,
        GraphicsError::InvalidStyleCode(..) => ErrorKind::TypeMismatch,
        GraphicsError::UnsupportedColorSpace(_) => ErrorKind::Unsupported,
    };
    m.error(kind, err.to_string())
}

// ---------------------------------------------------------------------------
// Stack manipulation
// ---------------------------------------------------------------------------

fn op_pop(m: &mut Machine) -> InterpResult<Control> {
    m.pop()?;
    Ok(Control::Continue)
}

fn op_dup(m: &mut Machine) -> InterpResult<Control> {
    let top = m.peek()?.clone();
    m.push(top);
    Ok(Control::Continue)
}

fn op_exch(m: &mut Machine) -> InterpResult<Control> {
    let b = m.pop()?;
    let a = m.pop()?;
    m.push(b);
    m.push(a);
    Ok(Control::Continue)
}

/// Only the `n copy` form. The composite-copy form is not supported.
fn op_copy(m: &mut Machine) -> InterpResult<Control> {
    match m.pop()? {
        Value::Integer(n) => {
            let n = usize::try_from(n).map_err(|_| {
                m.error(ErrorKind::IndexOutOfRange, format!("copy: negative count {n}"))
            })?;
            if n > m.operands.len() {
                return Err(m.error(
                    ErrorKind::StackUnderflow,
                    format!("copy: {n} requested, {} on the stack", m.operands.len()),
                ));
            }
            let start = m.operands.len() - n;
            let copies: Vec<Value> = m.operands[start..].to_vec();
            m.operands.extend(copies);
            Ok(Control::Continue)
        }
        other => Err(m.error(
            ErrorKind::Unsupported,
            format!("copy: only the counted form is supported, got {}", other.type_name()),
        )),
    }
}

fn op_index(m: &mut Machine) -> InterpResult<Control> {
    let n = m.pop_count("index")?;
    if n >= m.operands.len() {
        return Err(m.error(
            ErrorKind::StackUnderflow,
            format!("index: {n} requested, {} on the stack", m.operands.len()),
        ));
    }
    let value = m.operands[m.operands.len() - 1 - n].clone();
    m.push(value);
    Ok(Control::Continue)
}

fn op_roll(m: &mut Machine) -> InterpResult<Control> {
    let j = m.pop_int()?;
    let n = m.pop_count("roll")?;
    if n > m.operands.len() {
        return Err(m.error(
            ErrorKind::StackUnderflow,
            format!("roll: {n} requested, {} on the stack", m.operands.len()),
        ));
    }
    if n > 0 {
        let len = m.operands.len();
        // Positive j rolls toward the top of the stack.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let shift = j.rem_euclid(n as i64) as usize;
        m.operands[len - n..].rotate_right(shift);
    }
    Ok(Control::Continue)
}

fn op_mark(m: &mut Machine) -> InterpResult<Control> {
    m.push(Value::Mark);
    Ok(Control::Continue)
}

fn op_clear(m: &mut Machine) -> InterpResult<Control> {
    m.operands.clear();
    Ok(Control::Continue)
}

fn op_count(m: &mut Machine) -> InterpResult<Control> {
    let n = i64::try_from(m.operands.len()).unwrap_or(i64::MAX);
    m.push(Value::Integer(n));
    Ok(Control::Continue)
}

fn mark_position(m: &Machine) -> InterpResult<usize> {
    m.operands
        .iter()
        .rposition(|v| matches!(v, Value::Mark))
        .ok_or_else(|| m.error(ErrorKind::StackUnderflow, "no mark on the stack"))
}

fn op_counttomark(m: &mut Machine) -> InterpResult<Control> {
    let at = mark_position(m)?;
    let n = i64::try_from(m.operands.len() - 1 - at).unwrap_or(i64::MAX);
    m.push(Value::Integer(n));
    Ok(Control::Continue)
}

fn op_cleartomark(m: &mut Machine) -> InterpResult<Control> {
    let at = mark_position(m)?;
    m.operands.truncate(at);
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// Two numeric operands; `a` was pushed before `b`.
fn pop_two_numbers(m: &mut Machine) -> InterpResult<(Value, Value)> {
    let b = m.pop()?;
    let a = m.pop()?;
    if !a.is_numeric() {
        return Err(m.type_error("a number", &a));
    }
    if !b.is_numeric() {
        return Err(m.type_error("a number", &b));
    }
    Ok((a, b))
}

/// Integer op when both operands are integers, real op otherwise.
fn arith2(
    m: &mut Machine,
    int_op: fn(i64, i64) -> i64,
    real_op: fn(f64, f64) -> f64,
) -> InterpResult<Control> {
    let (a, b) = pop_two_numbers(m)?;
    let result = match (&a, &b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(int_op(*x, *y)),
        _ => Value::Real(real_op(
            a.as_scalar().unwrap_or_default(),
            b.as_scalar().unwrap_or_default(),
        )),
    };
    m.push(result);
    Ok(Control::Continue)
}

fn op_add(m: &mut Machine) -> InterpResult<Control> {
    arith2(m, i64::wrapping_add, |x, y| x + y)
}

fn op_sub(m: &mut Machine) -> InterpResult<Control> {
    arith2(m, i64::wrapping_sub, |x, y| x - y)
}

fn op_mul(m: &mut Machine) -> InterpResult<Control> {
    arith2(m, i64::wrapping_mul, |x, y| x * y)
}

/// Always produces a real, even for two integer operands.
fn op_div(m: &mut Machine) -> InterpResult<Control> {
    let (a, b) = pop_two_numbers(m)?;
    let y = b.as_scalar().unwrap_or_default();
    if y == 0.0 {
        return Err(m.error(ErrorKind::Arithmetic, "div: division by zero"));
    }
    m.push(Value::Real(a.as_scalar().unwrap_or_default() / y));
    Ok(Control::Continue)
}

fn op_idiv(m: &mut Machine) -> InterpResult<Control> {
    let y = m.pop_int()?;
    let x = m.pop_int()?;
    if y == 0 {
        return Err(m.error(ErrorKind::Arithmetic, "idiv: division by zero"));
    }
    m.push(Value::Integer(x.wrapping_div(y)));
    Ok(Control::Continue)
}

fn op_mod(m: &mut Machine) -> InterpResult<Control> {
    let y = m.pop_int()?;
    let x = m.pop_int()?;
    if y == 0 {
        return Err(m.error(ErrorKind::Arithmetic, "mod: division by zero"));
    }
    m.push(Value::Integer(x.wrapping_rem(y)));
    Ok(Control::Continue)
}

fn op_abs(m: &mut Machine) -> InterpResult<Control> {
    let result = match m.pop()? {
        Value::Integer(i) => Value::Integer(i.wrapping_abs()),
        Value::Real(r) => Value::Real(r.abs()),
        other => return Err(m.type_error("a number", &other)),
    };
    m.push(result);
    Ok(Control::Continue)
}

fn op_neg(m: &mut Machine) -> InterpResult<Control> {
    let result = match m.pop()? {
        Value::Integer(i) => Value::Integer(i.wrapping_neg()),
        Value::Real(r) => Value::Real(-r),
        other => return Err(m.type_error("a number", &other)),
    };
    m.push(result);
    Ok(Control::Continue)
}

fn op_sqrt(m: &mut Machine) -> InterpResult<Control> {
    let x = m.pop_scalar()?;
    if x < 0.0 {
        return Err(m.error(ErrorKind::Arithmetic, "sqrt: negative operand"));
    }
    m.push(Value::Real(x.sqrt()));
    Ok(Control::Continue)
}

fn op_round(m: &mut Machine) -> InterpResult<Control> {
    let result = match m.pop()? {
        Value::Integer(i) => Value::Integer(i),
        Value::Real(r) => Value::Real(r.round()),
        other => return Err(m.type_error("a number", &other)),
    };
    m.push(result);
    Ok(Control::Continue)
}

/// Type-preserving: an integer passes through unchanged.
fn op_truncate(m: &mut Machine) -> InterpResult<Control> {
    let result = match m.pop()? {
        Value::Integer(i) => Value::Integer(i),
        Value::Real(r) => Value::Real(r.trunc()),
        other => return Err(m.type_error("a number", &other)),
    };
    m.push(result);
    Ok(Control::Continue)
}

fn parse_numeral(m: &Machine, s: &StrSeg) -> InterpResult<f64> {
    let text = s.to_text();
    text.trim().parse::<f64>().map_err(|_| {
        m.error(
            ErrorKind::Arithmetic,
            format!("malformed numeral \"{}\"", text.trim()),
        )
    })
}

fn op_cvi(m: &mut Machine) -> InterpResult<Control> {
    let value = match m.pop()? {
        Value::Integer(i) => i,
        // f64 → i64 saturates at the extremes, which is fine for page math.
        #[allow(clippy::cast_possible_truncation)]
        Value::Real(r) => r.trunc() as i64,
        Value::String(s) => {
            #[allow(clippy::cast_possible_truncation)]
            {
                parse_numeral(m, &s)?.trunc() as i64
            }
        }
        other => return Err(m.type_error("a number or string", &other)),
    };
    m.push(Value::Integer(value));
    Ok(Control::Continue)
}

fn op_cvr(m: &mut Machine) -> InterpResult<Control> {
    let value = match m.pop()? {
        Value::Integer(i) => {
            #[allow(clippy::cast_precision_loss)]
            {
                i as f64
            }
        }
        Value::Real(r) => r,
        Value::String(s) => parse_numeral(m, &s)?,
        other => return Err(m.type_error("a number or string", &other)),
    };
    m.push(Value::Real(value));
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Comparison and logic
// ---------------------------------------------------------------------------

/// Equality across kinds: numerics coerce, composites compare by handle,
/// strings by content, names by spelling. Different kinds are unequal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        _ if a.is_numeric() && b.is_numeric() => {
            a.as_scalar().unwrap_or_default() == b.as_scalar().unwrap_or_default()
        }
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::String(x), Value::String(y)) => x.content_eq(y),
        (Value::Name { name: x, .. }, Value::Name { name: y, .. }) => x == y,
        (Value::Null, Value::Null) | (Value::Mark, Value::Mark) => true,
        (Value::Array(x), Value::Array(y)) => x.handle_eq(y),
        (
            Value::Dictionary(x) | Value::Font(x),
            Value::Dictionary(y) | Value::Font(y),
        ) => x.handle_eq(y),
        (Value::Procedure(x), Value::Procedure(y)) => Rc::ptr_eq(&x.body, &y.body),
        (Value::Operator(x), Value::Operator(y)) => x.name == y.name,
        (Value::Matrix(x), Value::Matrix(y)) => x.as_coeffs() == y.as_coeffs(),
        (Value::Save(x), Value::Save(y)) => x == y,
        _ => false,
    }
}

fn op_eq(m: &mut Machine) -> InterpResult<Control> {
    let b = m.pop()?;
    let a = m.pop()?;
    m.push(Value::Boolean(values_equal(&a, &b)));
    Ok(Control::Continue)
}

fn op_ne(m: &mut Machine) -> InterpResult<Control> {
    let b = m.pop()?;
    let a = m.pop()?;
    m.push(Value::Boolean(!values_equal(&a, &b)));
    Ok(Control::Continue)
}

/// Ordering comparisons are numeric-only; string ordering is unsupported.
fn compare(m: &mut Machine, op: fn(f64, f64) -> bool) -> InterpResult<Control> {
    let b = m.pop()?;
    let a = m.pop()?;
    if matches!((&a, &b), (Value::String(_), Value::String(_))) {
        return Err(m.error(
            ErrorKind::Unsupported,
            "string ordering comparison is not implemented",
        ));
    }
    if !a.is_numeric() {
        return Err(m.type_error("a number", &a));
    }
    if !b.is_numeric() {
        return Err(m.type_error("a number", &b));
    }
    m.push(Value::Boolean(op(
        a.as_scalar().unwrap_or_default(),
        b.as_scalar().unwrap_or_default(),
    )));
    Ok(Control::Continue)
}

fn op_lt(m: &mut Machine) -> InterpResult<Control> {
    compare(m, |x, y| x < y)
}

fn op_gt(m: &mut Machine) -> InterpResult<Control> {
    compare(m, |x, y| x > y)
}

fn op_le(m: &mut Machine) -> InterpResult<Control> {
    compare(m, |x, y| x <= y)
}

fn op_ge(m: &mut Machine) -> InterpResult<Control> {
    compare(m, |x, y| x >= y)
}

/// Bitwise on two integers, logical on two booleans.
fn logic2(
    m: &mut Machine,
    int_op: fn(i64, i64) -> i64,
    bool_op: fn(bool, bool) -> bool,
) -> InterpResult<Control> {
    let b = m.pop()?;
    let a = m.pop()?;
    let result = match (&a, &b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(int_op(*x, *y)),
        (Value::Boolean(x), Value::Boolean(y)) => Value::Boolean(bool_op(*x, *y)),
        _ => {
            return Err(m.error(
                ErrorKind::TypeMismatch,
                format!(
                    "expected two integers or two booleans, got {} and {}",
                    a.type_name(),
                    b.type_name()
                ),
            ));
        }
    };
    m.push(result);
    Ok(Control::Continue)
}

fn op_and(m: &mut Machine) -> InterpResult<Control> {
    logic2(m, |x, y| x & y, |x, y| x && y)
}

fn op_or(m: &mut Machine) -> InterpResult<Control> {
    logic2(m, |x, y| x | y, |x, y| x || y)
}

fn op_not(m: &mut Machine) -> InterpResult<Control> {
    let result = match m.pop()? {
        Value::Integer(i) => Value::Integer(!i),
        Value::Boolean(b) => Value::Boolean(!b),
        other => return Err(m.type_error("an integer or boolean", &other)),
    };
    m.push(result);
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

fn op_array(m: &mut Machine) -> InterpResult<Control> {
    let n = m.pop_count("array")?;
    m.push(Value::Array(ArraySeg::with_len(n)));
    Ok(Control::Continue)
}

fn op_string(m: &mut Machine) -> InterpResult<Control> {
    let n = m.pop_count("string")?;
    m.push(Value::String(StrSeg::with_len(n)));
    Ok(Control::Continue)
}

fn op_length(m: &mut Machine) -> InterpResult<Control> {
    let len = match m.pop()? {
        Value::Array(a) => a.len(),
        Value::String(s) => s.len(),
        Value::Dictionary(d) | Value::Font(d) => d.len(),
        Value::Name { name, .. } => name.len(),
        other => return Err(m.type_error("a composite object", &other)),
    };
    m.push(Value::Integer(i64::try_from(len).unwrap_or(i64::MAX)));
    Ok(Control::Continue)
}

fn index_operand(m: &Machine, key: &Value, len: usize) -> InterpResult<usize> {
    let Value::Integer(i) = key else {
        return Err(m.type_error("an integer index", key));
    };
    usize::try_from(*i)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| {
            m.error(
                ErrorKind::IndexOutOfRange,
                format!("index {i} out of range for length {len}"),
            )
        })
}

fn op_get(m: &mut Machine) -> InterpResult<Control> {
    let key = m.pop()?;
    let result = match m.pop()? {
        Value::Array(a) => {
            let i = index_operand(m, &key, a.len())?;
            a.get(i).unwrap_or(Value::Null)
        }
        Value::String(s) => {
            let i = index_operand(m, &key, s.len())?;
            Value::Integer(i64::from(s.get(i).unwrap_or_default()))
        }
        Value::Dictionary(d) | Value::Font(d) => {
            let Value::Name { name, .. } = &key else {
                return Err(m.type_error("a name key", &key));
            };
            d.get(name).ok_or_else(|| {
                m.error(
                    ErrorKind::UndefinedName,
                    format!("dictionary has no key '/{name}'"),
                )
            })?
        }
        other => return Err(m.type_error("an array, string, or dictionary", &other)),
    };
    m.push(result);
    Ok(Control::Continue)
}

fn op_put(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    let key = m.pop()?;
    match m.pop()? {
        Value::Array(a) => {
            let i = index_operand(m, &key, a.len())?;
            a.set(i, value);
        }
        Value::String(s) => {
            let i = index_operand(m, &key, s.len())?;
            let Value::Integer(byte) = value else {
                return Err(m.type_error("an integer byte", &value));
            };
            // Low byte only, as string stores do.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            s.set(i, (byte & 0xff) as u8);
        }
        Value::Dictionary(d) | Value::Font(d) => {
            let Value::Name { name, .. } = &key else {
                return Err(m.type_error("a name key", &key));
            };
            d.insert(name, value)?;
        }
        other => return Err(m.type_error("an array, string, or dictionary", &other)),
    }
    Ok(Control::Continue)
}

/// `index count getinterval`: a sub-view aliasing the original.
fn op_getinterval(m: &mut Machine) -> InterpResult<Control> {
    let count = m.pop_count("getinterval")?;
    let index = m.pop_count("getinterval")?;
    let result = match m.pop()? {
        Value::Array(a) => a
            .slice(index, count)
            .map(Value::Array),
        Value::String(s) => s
            .slice(index, count)
            .map(Value::String),
        other => return Err(m.type_error("an array or string", &other)),
    };
    let result = result.ok_or_else(|| {
        m.error(
            ErrorKind::IndexOutOfRange,
            format!("getinterval: {index}+{count} exceeds the object length"),
        )
    })?;
    m.push(result);
    Ok(Control::Continue)
}

fn op_putinterval(m: &mut Machine) -> InterpResult<Control> {
    let src = m.pop()?;
    let index = m.pop_count("putinterval")?;
    let ok = match (m.pop()?, &src) {
        (Value::Array(dst), Value::Array(src)) => dst.copy_from(src, index),
        (Value::String(dst), Value::String(src)) => dst.copy_from(src, index),
        (dst, _) => {
            return Err(m.error(
                ErrorKind::TypeMismatch,
                format!(
                    "putinterval: mismatched {} and {}",
                    dst.type_name(),
                    src.type_name()
                ),
            ));
        }
    };
    if !ok {
        return Err(m.error(
            ErrorKind::IndexOutOfRange,
            "putinterval: source does not fit at that offset",
        ));
    }
    Ok(Control::Continue)
}

/// Fill an array from the stack, topmost operand landing last.
fn op_astore(m: &mut Machine) -> InterpResult<Control> {
    let arr = m.pop_array()?;
    if m.operands.len() < arr.len() {
        return Err(m.error(
            ErrorKind::StackUnderflow,
            format!(
                "astore: array of {} but only {} operands",
                arr.len(),
                m.operands.len()
            ),
        ));
    }
    for i in (0..arr.len()).rev() {
        let value = m.pop()?;
        arr.set(i, value);
    }
    m.push(Value::Array(arr));
    Ok(Control::Continue)
}

fn op_aload(m: &mut Machine) -> InterpResult<Control> {
    let arr = m.pop_array()?;
    for value in arr.to_vec() {
        m.push(value);
    }
    m.push(Value::Array(arr));
    Ok(Control::Continue)
}

fn op_anchorsearch(m: &mut Machine) -> InterpResult<Control> {
    let seek = m.pop_string()?;
    let subject = m.pop_string()?;
    if subject.starts_with(&seek) {
        // Both results alias the subject's backing buffer.
        let matched = subject.slice(0, seek.len());
        let post = subject.slice(seek.len(), subject.len() - seek.len());
        let (Some(matched), Some(post)) = (matched, post) else {
            return Err(m.error(ErrorKind::IndexOutOfRange, "anchorsearch: bad split"));
        };
        m.push(Value::String(post));
        m.push(Value::String(matched));
        m.push(Value::Boolean(true));
    } else {
        m.push(Value::String(subject));
        m.push(Value::Boolean(false));
    }
    Ok(Control::Continue)
}

/// Only primitive operators count as executable here.
fn op_xcheck(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    m.push(Value::Boolean(matches!(value, Value::Operator(_))));
    Ok(Control::Continue)
}

fn access_check(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    let writable = match value {
        Value::Array(_) | Value::String(_) | Value::Procedure(_) => true,
        Value::Dictionary(d) | Value::Font(d) => !matches!(d, Dict::System(_)),
        other => return Err(m.type_error("a composite object", &other)),
    };
    m.push(Value::Boolean(writable));
    Ok(Control::Continue)
}

fn op_rcheck(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    match value {
        Value::Array(_)
        | Value::String(_)
        | Value::Procedure(_)
        | Value::Dictionary(_)
        | Value::Font(_) => {
            m.push(Value::Boolean(true));
            Ok(Control::Continue)
        }
        other => Err(m.type_error("a composite object", &other)),
    }
}

fn op_wcheck(m: &mut Machine) -> InterpResult<Control> {
    access_check(m)
}

// ---------------------------------------------------------------------------
// Dictionaries
// ---------------------------------------------------------------------------

fn op_dict(m: &mut Machine) -> InterpResult<Control> {
    let n = m.pop_count("dict")?;
    m.push(Value::Dictionary(Dict::with_capacity(n.max(1))));
    Ok(Control::Continue)
}

fn op_begin(m: &mut Machine) -> InterpResult<Control> {
    let dict = m.pop_dict()?;
    m.begin_scope(dict);
    Ok(Control::Continue)
}

fn op_end(m: &mut Machine) -> InterpResult<Control> {
    m.end_scope()?;
    Ok(Control::Continue)
}

fn op_def(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    let key = m.pop_name()?;
    m.define(&key, value)?;
    Ok(Control::Continue)
}

fn op_load(m: &mut Machine) -> InterpResult<Control> {
    let key = m.pop_name()?;
    let value = m.resolve(&key).ok_or_else(|| {
        m.error(ErrorKind::UndefinedName, format!("'{key}' is not defined"))
    })?;
    m.push(value);
    Ok(Control::Continue)
}

fn op_where(m: &mut Machine) -> InterpResult<Control> {
    let key = m.pop_name()?;
    match m.resolve_in(&key) {
        Some((_, dict)) => {
            m.push(Value::Dictionary(dict));
            m.push(Value::Boolean(true));
        }
        None => m.push(Value::Boolean(false)),
    }
    Ok(Control::Continue)
}

fn op_known(m: &mut Machine) -> InterpResult<Control> {
    let key = m.pop_name()?;
    let dict = m.pop_dict()?;
    m.push(Value::Boolean(dict.contains(&key)));
    Ok(Control::Continue)
}

fn op_userdict(m: &mut Machine) -> InterpResult<Control> {
    let dict = m.user_dict();
    m.push(Value::Dictionary(dict));
    Ok(Control::Continue)
}

fn op_systemdict(m: &mut Machine) -> InterpResult<Control> {
    let dict = m.system_dict();
    m.push(Value::Dictionary(dict));
    Ok(Control::Continue)
}

fn op_statusdict(m: &mut Machine) -> InterpResult<Control> {
    let dict = m.status_dict();
    m.push(Value::Dictionary(dict));
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

fn op_if(m: &mut Machine) -> InterpResult<Control> {
    let proc = m.pop_proc()?;
    let cond = m.pop_bool()?;
    if cond {
        m.evaluate(Value::Procedure(proc), 0)
    } else {
        Ok(Control::Continue)
    }
}

fn op_ifelse(m: &mut Machine) -> InterpResult<Control> {
    let otherwise = m.pop_proc()?;
    let then = m.pop_proc()?;
    let cond = m.pop_bool()?;
    let chosen = if cond { then } else { otherwise };
    m.evaluate(Value::Procedure(chosen), 0)
}

fn op_exec(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    m.evaluate(value, 0)
}

/// Repeats until the body signals `exit`. `stop` passes through to the
/// nearest `stopped`.
fn op_loop(m: &mut Machine) -> InterpResult<Control> {
    let proc = m.pop_proc()?;
    loop {
        match m.evaluate(Value::Procedure(proc.clone()), 0)? {
            Control::Continue => {}
            Control::Exit => return Ok(Control::Continue),
            Control::Stop => return Ok(Control::Stop),
        }
    }
}

fn op_exit(_m: &mut Machine) -> InterpResult<Control> {
    Ok(Control::Exit)
}

fn op_stop(_m: &mut Machine) -> InterpResult<Control> {
    Ok(Control::Stop)
}

/// Runs the operand and reports whether it stopped. `exit` is not caught
/// here; it belongs to the nearest enclosing loop.
fn op_stopped(m: &mut Machine) -> InterpResult<Control> {
    let value = m.pop()?;
    match m.evaluate(value, 0)? {
        Control::Continue => {
            m.push(Value::Boolean(false));
            Ok(Control::Continue)
        }
        Control::Stop => {
            m.push(Value::Boolean(true));
            Ok(Control::Continue)
        }
        Control::Exit => Ok(Control::Exit),
    }
}

/// Early binding: executable names in the body are replaced with their
/// current definitions. Substituted procedures are marked executable so
/// they still run when met inside the body; nested literal procedures are
/// bound recursively.
fn bind_body(m: &Machine, body: &Rc<RefCell<Vec<Value>>>) {
    let mut body = body.borrow_mut();
    for slot in body.iter_mut() {
        match slot {
            Value::Name {
                name,
                executable: true,
            } => match m.resolve(name) {
                Some(Value::Operator(op)) => *slot = Value::Operator(op),
                Some(Value::Procedure(mut proc)) => {
                    proc.executable = true;
                    *slot = Value::Procedure(proc);
                }
                _ => {}
            },
            Value::Procedure(proc) => bind_body(m, &proc.body),
            _ => {}
        }
    }
}

fn op_bind(m: &mut Machine) -> InterpResult<Control> {
    let proc = m.pop_proc()?;
    bind_body(m, &proc.body);
    m.push(Value::Procedure(proc));
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Save and restore
// ---------------------------------------------------------------------------

fn op_save(m: &mut Machine) -> InterpResult<Control> {
    let index = m.push_save_point();
    log::debug!("save point {index}");
    m.push(Value::Save(index));
    Ok(Control::Continue)
}

fn op_restore(m: &mut Machine) -> InterpResult<Control> {
    match m.pop()? {
        Value::Save(index) => {
            log::debug!("restoring save point {index}");
            m.restore_save_point(index)?;
            Ok(Control::Continue)
        }
        other => Err(m.type_error("a save object", &other)),
    }
}

// ---------------------------------------------------------------------------
// Path construction and painting
// ---------------------------------------------------------------------------

fn op_newpath(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.new_path();
    Ok(Control::Continue)
}

fn op_moveto(m: &mut Machine) -> InterpResult<Control> {
    let y = m.pop_scalar()?;
    let x = m.pop_scalar()?;
    m.graphics.move_to(x, y);
    Ok(Control::Continue)
}

fn op_lineto(m: &mut Machine) -> InterpResult<Control> {
    let y = m.pop_scalar()?;
    let x = m.pop_scalar()?;
    m.graphics.line_to(x, y);
    Ok(Control::Continue)
}

fn op_curveto(m: &mut Machine) -> InterpResult<Control> {
    let y3 = m.pop_scalar()?;
    let x3 = m.pop_scalar()?;
    let y2 = m.pop_scalar()?;
    let x2 = m.pop_scalar()?;
    let y1 = m.pop_scalar()?;
    let x1 = m.pop_scalar()?;
    m.graphics.curve_to(x1, y1, x2, y2, x3, y3);
    Ok(Control::Continue)
}

fn op_closepath(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.close_path();
    Ok(Control::Continue)
}

fn op_fill(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.fill();
    Ok(Control::Continue)
}

fn op_eofill(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.eofill();
    Ok(Control::Continue)
}

fn op_stroke(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.stroke();
    Ok(Control::Continue)
}

fn op_clip(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.clip();
    Ok(Control::Continue)
}

fn op_eoclip(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.eoclip();
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Graphics state
// ---------------------------------------------------------------------------

fn op_gsave(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.gsave();
    Ok(Control::Continue)
}

fn op_grestore(m: &mut Machine) -> InterpResult<Control> {
    m.graphics.grestore().map_err(|e| graphics_error(m, e))?;
    Ok(Control::Continue)
}

fn op_setgray(m: &mut Machine) -> InterpResult<Control> {
    let v = m.pop_scalar()?;
    m.graphics.set_gray(v);
    Ok(Control::Continue)
}

fn op_setrgbcolor(m: &mut Machine) -> InterpResult<Control> {
    let b = m.pop_scalar()?;
    let g = m.pop_scalar()?;
    let r = m.pop_scalar()?;
    m.graphics.set_rgb_color(r, g, b);
    Ok(Control::Continue)
}

fn op_currentgray(m: &mut Machine) -> InterpResult<Control> {
    let v = m.graphics.current_gray().map_err(|e| graphics_error(m, e))?;
    m.push(Value::Real(v));
    Ok(Control::Continue)
}

fn op_setlinewidth(m: &mut Machine) -> InterpResult<Control> {
    let width = m.pop_scalar()?;
    m.graphics.set_line_width(width);
    Ok(Control::Continue)
}

fn op_setlinecap(m: &mut Machine) -> InterpResult<Control> {
    let code = m.pop_int()?;
    m.graphics
        .set_line_cap(code)
        .map_err(|e| graphics_error(m, e))?;
    Ok(Control::Continue)
}

fn op_setlinejoin(m: &mut Machine) -> InterpResult<Control> {
    let code = m.pop_int()?;
    m.graphics
        .set_line_join(code)
        .map_err(|e| graphics_error(m, e))?;
    Ok(Control::Continue)
}

fn op_setmiterlimit(m: &mut Machine) -> InterpResult<Control> {
    let limit = m.pop_scalar()?;
    m.graphics.set_miter_limit(limit);
    Ok(Control::Continue)
}

fn op_setdash(m: &mut Machine) -> InterpResult<Control> {
    let offset = m.pop_scalar()?;
    let arr = m.pop_array()?;
    let mut dashes = Vec::with_capacity(arr.len());
    for i in 0..arr.len() {
        let element = arr.get(i).unwrap_or(Value::Null);
        let length = element
            .as_scalar()
            .ok_or_else(|| m.type_error("a number", &element))?;
        dashes.push(length);
    }
    m.graphics.set_dash(DashPattern { dashes, offset });
    Ok(Control::Continue)
}

fn op_setflat(m: &mut Machine) -> InterpResult<Control> {
    let flatness = m.pop_scalar()?;
    m.graphics.set_flat(flatness);
    Ok(Control::Continue)
}

fn op_currentflat(m: &mut Machine) -> InterpResult<Control> {
    let flatness = m.graphics.current_flat();
    m.push(Value::Real(flatness));
    Ok(Control::Continue)
}

fn op_settransfer(m: &mut Machine) -> InterpResult<Control> {
    let _proc = m.pop_proc()?;
    log::warn!("settransfer is ignored; colors are emitted unadjusted");
    Ok(Control::Continue)
}

fn op_currenttransfer(m: &mut Machine) -> InterpResult<Control> {
    log::warn!("currenttransfer returns an empty procedure");
    m.push(Value::Procedure(Procedure::new(Vec::new())));
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Matrices
// ---------------------------------------------------------------------------

fn op_matrix(m: &mut Machine) -> InterpResult<Control> {
    m.push(Value::Matrix(Affine::IDENTITY));
    Ok(Control::Continue)
}

fn op_setmatrix(m: &mut Machine) -> InterpResult<Control> {
    let mtx = m.pop_matrix()?;
    m.graphics.set_matrix(mtx);
    Ok(Control::Continue)
}

/// The popped matrix operand is a placeholder container; the result is a
/// fresh value.
fn op_currentmatrix(m: &mut Machine) -> InterpResult<Control> {
    let _container = m.pop_matrix()?;
    let ctm = m.graphics.current().ctm;
    m.push(Value::Matrix(ctm));
    Ok(Control::Continue)
}

fn op_defaultmatrix(m: &mut Machine) -> InterpResult<Control> {
    let _container = m.pop_matrix()?;
    m.push(Value::Matrix(DEFAULT_OUTPUT_MATRIX));
    Ok(Control::Continue)
}

fn op_invertmatrix(m: &mut Machine) -> InterpResult<Control> {
    let _container = m.pop_matrix()?;
    let src = m.pop_matrix()?;
    let inverse = invert(src).map_err(|e| graphics_error(m, e))?;
    m.push(Value::Matrix(inverse));
    Ok(Control::Continue)
}

fn op_concat(m: &mut Machine) -> InterpResult<Control> {
    let mtx = m.pop_matrix()?;
    m.graphics.concat(mtx);
    Ok(Control::Continue)
}

/// `x y transform` uses the CTM; `x y m transform` uses the given matrix.
fn pop_point_and_matrix(m: &mut Machine) -> InterpResult<(Point, Affine)> {
    let top = m.pop()?;
    match top {
        Value::Matrix(mtx) => {
            let y = m.pop_scalar()?;
            let x = m.pop_scalar()?;
            Ok((Point::new(x, y), mtx))
        }
        other => {
            let y = other.as_scalar().ok_or_else(|| m.type_error("a number", &other))?;
            let x = m.pop_scalar()?;
            Ok((Point::new(x, y), m.graphics.current().ctm))
        }
    }
}

fn op_transform(m: &mut Machine) -> InterpResult<Control> {
    let (p, mtx) = pop_point_and_matrix(m)?;
    let p = mtx * p;
    m.push(Value::Real(p.x));
    m.push(Value::Real(p.y));
    Ok(Control::Continue)
}

fn op_itransform(m: &mut Machine) -> InterpResult<Control> {
    let (p, mtx) = pop_point_and_matrix(m)?;
    let p = invert(mtx).map_err(|e| graphics_error(m, e))? * p;
    m.push(Value::Real(p.x));
    m.push(Value::Real(p.y));
    Ok(Control::Continue)
}

/// Distance transform: translation does not apply.
fn op_dtransform(m: &mut Machine) -> InterpResult<Control> {
    let (p, mtx) = pop_point_and_matrix(m)?;
    let p = linear_part(mtx) * p;
    m.push(Value::Real(p.x));
    m.push(Value::Real(p.y));
    Ok(Control::Continue)
}

fn op_translate(m: &mut Machine) -> InterpResult<Control> {
    match m.pop()? {
        Value::Matrix(mtx) => {
            let ty = m.pop_scalar()?;
            let tx = m.pop_scalar()?;
            m.push(Value::Matrix(mtx * Affine::translate((tx, ty))));
        }
        other => {
            let ty = other.as_scalar().ok_or_else(|| m.type_error("a number", &other))?;
            let tx = m.pop_scalar()?;
            m.graphics.translate(tx, ty);
        }
    }
    Ok(Control::Continue)
}

fn op_rotate(m: &mut Machine) -> InterpResult<Control> {
    match m.pop()? {
        Value::Matrix(mtx) => {
            let degrees = m.pop_scalar()?;
            m.push(Value::Matrix(mtx * Affine::rotate(degrees.to_radians())));
        }
        other => {
            let degrees =
                other.as_scalar().ok_or_else(|| m.type_error("a number", &other))?;
            m.graphics.rotate(degrees);
        }
    }
    Ok(Control::Continue)
}

fn op_scale(m: &mut Machine) -> InterpResult<Control> {
    match m.pop()? {
        Value::Matrix(mtx) => {
            let sy = m.pop_scalar()?;
            let sx = m.pop_scalar()?;
            m.push(Value::Matrix(mtx * Affine::scale_non_uniform(sx, sy)));
        }
        other => {
            let sy = other.as_scalar().ok_or_else(|| m.type_error("a number", &other))?;
            let sx = m.pop_scalar()?;
            m.graphics.scale(sx, sy);
        }
    }
    Ok(Control::Continue)
}

// ---------------------------------------------------------------------------
// Fonts and miscellany
// ---------------------------------------------------------------------------

/// The standard-key skeleton every `findfont` result carries.
fn stub_font() -> Dict {
    let mut table = SymbolDict::with_buckets(8);
    table.insert("FontType", Value::Null);
    table.insert("FontMatrix", Value::Null);
    table.insert(
        "FontBBox",
        Value::Array(ArraySeg::from_vec(vec![Value::Integer(0); 4])),
    );
    table.insert(
        "Encoding",
        Value::Array(ArraySeg::from_vec(
            (0..256i64).map(Value::Integer).collect(),
        )),
    );
    table.insert("PaintType", Value::Integer(0));
    table.insert("CharStrings", Value::Dictionary(Dict::with_capacity(1)));
    table.insert("Private", Value::Dictionary(Dict::with_capacity(1)));
    Dict::from_table(Rc::new(RefCell::new(table)))
}

fn op_findfont(m: &mut Machine) -> InterpResult<Control> {
    let name = m.pop_name()?;
    log::warn!("font '{name}' is not available; substituting a stub font");
    m.push(Value::Font(stub_font()));
    Ok(Control::Continue)
}

fn op_null(m: &mut Machine) -> InterpResult<Control> {
    m.push(Value::Null);
    Ok(Control::Continue)
}

fn op_version(m: &mut Machine) -> InterpResult<Control> {
    m.push(Value::String(StrSeg::from_text(env!("CARGO_PKG_VERSION"))));
    Ok(Control::Continue)
}
