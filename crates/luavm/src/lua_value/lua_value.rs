// LuaValue - tagged value over the eight runtime kinds
//
// Numbers are a single f64 kind; "integer" is a derived property
// (finite, zero fractional part, inside the i64 range).

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::{LuaFunction, LuaString, LuaTable, NativeFunction, TableRef, ThreadRef};
use crate::lua_value::parse_number::parse_lua_number;
use crate::lua_vm::LuaState;

/// Coarse kind of a value, used for type names and dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    CFunction,
    Thread,
}

#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(LuaString),
    Table(TableRef),
    Function(Rc<LuaFunction>),
    CFunction(Rc<NativeFunction>),
    Thread(ThreadRef),
}

impl LuaValue {
    #[inline(always)]
    pub const fn nil() -> Self {
        LuaValue::Nil
    }

    #[inline(always)]
    pub const fn boolean(b: bool) -> Self {
        LuaValue::Boolean(b)
    }

    #[inline(always)]
    pub const fn number(n: f64) -> Self {
        LuaValue::Number(n)
    }

    #[inline(always)]
    pub fn integer(i: i64) -> Self {
        LuaValue::Number(i as f64)
    }

    #[inline]
    pub fn string(s: &str) -> Self {
        LuaValue::String(LuaString::new(s))
    }

    pub fn table(table: LuaTable) -> Self {
        LuaValue::Table(Rc::new(RefCell::new(table)))
    }

    pub fn function(func: LuaFunction) -> Self {
        LuaValue::Function(Rc::new(func))
    }

    pub fn cfunction(name: &'static str, func: super::CFunction) -> Self {
        LuaValue::CFunction(Rc::new(NativeFunction::new(name, func)))
    }

    pub fn thread(state: ThreadRef) -> Self {
        LuaValue::Thread(state)
    }

    pub fn kind(&self) -> LuaValueKind {
        match self {
            LuaValue::Nil => LuaValueKind::Nil,
            LuaValue::Boolean(_) => LuaValueKind::Boolean,
            LuaValue::Number(_) => LuaValueKind::Number,
            LuaValue::String(_) => LuaValueKind::String,
            LuaValue::Table(_) => LuaValueKind::Table,
            LuaValue::Function(_) => LuaValueKind::Function,
            LuaValue::CFunction(_) => LuaValueKind::CFunction,
            LuaValue::Thread(_) => LuaValueKind::Thread,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            LuaValueKind::Nil => "nil",
            LuaValueKind::Boolean => "boolean",
            LuaValueKind::Number => "number",
            LuaValueKind::String => "string",
            LuaValueKind::Table => "table",
            LuaValueKind::Function | LuaValueKind::CFunction => "function",
            LuaValueKind::Thread => "thread",
        }
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    #[inline(always)]
    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Number(_))
    }

    #[inline(always)]
    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::String(_))
    }

    #[inline(always)]
    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    /// Script closure or native function
    #[inline(always)]
    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_) | LuaValue::CFunction(_))
    }

    #[inline(always)]
    pub fn is_thread(&self) -> bool {
        matches!(self, LuaValue::Thread(_))
    }

    /// nil and false are falsy, everything else is truthy
    #[inline(always)]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    #[inline(always)]
    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LuaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Raw number, no string coercion
    #[inline(always)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Raw number with an integer representation, no string coercion
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().and_then(float_to_integer)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_lua_string(&self) -> Option<&LuaString> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadRef> {
        match self {
            LuaValue::Thread(t) => Some(t),
            _ => None,
        }
    }

    /// Numeric coercion used by arithmetic: numbers as-is, numeric strings parsed
    pub fn to_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            LuaValue::String(s) => parse_lua_number(s.as_str()),
            _ => None,
        }
    }

    /// Integer coercion used by bitwise operators
    pub fn to_integer(&self) -> Option<i64> {
        self.to_number().and_then(float_to_integer)
    }

    /// Metatable of a table value; other kinds carry none
    pub fn metatable(&self) -> Option<TableRef> {
        match self {
            LuaValue::Table(t) => t.borrow().get_metatable(),
            _ => None,
        }
    }

    /// Look up `event` in this value's metatable (raw access)
    pub fn get_metamethod(&self, event: &str) -> Option<LuaValue> {
        let mt = self.metatable()?;
        let handler = mt.borrow().get_str(event);
        if handler.is_nil() { None } else { Some(handler) }
    }

    /// Identity used in `tostring` for reference kinds
    pub fn raw_ptr(&self) -> Option<*const ()> {
        match self {
            LuaValue::Table(t) => Some(Rc::as_ptr(t) as *const ()),
            LuaValue::Function(f) => Some(Rc::as_ptr(f) as *const ()),
            LuaValue::CFunction(f) => Some(Rc::as_ptr(f) as *const ()),
            LuaValue::Thread(t) => Some(Rc::as_ptr(t) as *const ()),
            _ => None,
        }
    }

    /// Key for the array part: a number with an integer value >= 1
    #[inline]
    pub(crate) fn as_array_index(&self) -> Option<usize> {
        match self {
            LuaValue::Number(n) if *n >= 1.0 && n.fract() == 0.0 && *n < usize::MAX as f64 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }
}

/// f64 -> i64 when the value is integral and in range
#[inline]
pub fn float_to_integer(n: f64) -> Option<i64> {
    // -2^63 is exact; 2^63 is the first value out of range
    if n.fract() == 0.0 && n >= -9_223_372_036_854_775_808.0 && n < 9_223_372_036_854_775_808.0 {
        Some(n as i64)
    } else {
        None
    }
}

/// Number formatting: integral values print without a fraction, others as `%.14g`
pub fn format_number(n: f64) -> String {
    if let Some(i) = float_to_integer(n) {
        if n != 0.0 || n.is_sign_positive() {
            let mut buf = itoa::Buffer::new();
            return buf.format(i).to_string();
        }
        return "-0".to_string();
    }
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format_g14(n)
}

fn format_g14(n: f64) -> String {
    const PRECISION: i32 = 14;
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if exp < -4 || exp >= PRECISION {
        let mantissa = strip_trailing_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl PartialEq for LuaValue {
    /// Raw equality: tags must match; references compare by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Function(a), LuaValue::Function(b)) => Rc::ptr_eq(a, b),
            (LuaValue::CFunction(a), LuaValue::CFunction(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// NaN never reaches a table key, so raw equality is reflexive for every stored key
impl Eq for LuaValue {}

impl Hash for LuaValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LuaValue::Nil => {}
            LuaValue::Boolean(b) => b.hash(state),
            LuaValue::Number(n) => {
                // 0.0 and -0.0 are the same key
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state)
            }
            LuaValue::String(s) => s.hash(state),
            other => (other.raw_ptr().unwrap_or(std::ptr::null()) as usize).hash(state),
        }
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{}", b),
            LuaValue::Number(n) => write!(f, "{}", format_number(*n)),
            LuaValue::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{}", b),
            LuaValue::Number(n) => f.write_str(&format_number(*n)),
            LuaValue::String(s) => f.write_str(s.as_str()),
            LuaValue::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            LuaValue::Function(func) => write!(f, "function: {:p}", Rc::as_ptr(func)),
            LuaValue::CFunction(func) => write!(f, "function: builtin: {:p}", Rc::as_ptr(func)),
            LuaValue::Thread(t) => write!(f, "thread: {:p}", Rc::as_ptr(t)),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<i64> for LuaValue {
    fn from(i: i64) -> Self {
        LuaValue::Number(i as f64)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::string(s)
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::string(&s)
    }
}

impl From<TableRef> for LuaValue {
    fn from(t: TableRef) -> Self {
        LuaValue::Table(t)
    }
}

impl From<Rc<RefCell<LuaState>>> for LuaValue {
    fn from(t: Rc<RefCell<LuaState>>) -> Self {
        LuaValue::Thread(t)
    }
}
