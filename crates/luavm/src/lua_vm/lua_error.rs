use thiserror::Error;

use crate::lua_value::LuaValue;

/// Runtime failure kinds.
///
/// Everything except `InvalidOperation` can be intercepted by a protected call;
/// `InvalidOperation` reports a broken contract between the engine and its host.
#[derive(Debug, Clone, Error)]
pub enum LuaError {
    /// Operand of the wrong kind: calling a non-function, indexing a non-table,
    /// arithmetic on non-numbers, length of a non-sequence
    #[error("{0}")]
    TypeError(String),
    /// Native function called with a bad argument count or type
    #[error("{0}")]
    ArgumentError(String),
    /// Value stack or call stack capacity exceeded
    #[error("{0}")]
    StackOverflow(String),
    /// Value raised with `error`, or a runtime failure reported by a native
    #[error("{0}")]
    UserError(LuaValue),
    /// Engine contract violated (resuming a dead thread, malformed bytecode, ...)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl LuaError {
    /// Whether a protected-call boundary may turn this error into a value
    #[inline]
    pub fn is_catchable(&self) -> bool {
        !matches!(self, LuaError::InvalidOperation(_))
    }

    /// The value a protected call hands back to script code
    pub fn into_value(self) -> LuaValue {
        match self {
            LuaError::UserError(value) => value,
            LuaError::TypeError(msg)
            | LuaError::ArgumentError(msg)
            | LuaError::StackOverflow(msg)
            | LuaError::InvalidOperation(msg) => LuaValue::from(msg),
        }
    }

    /// Same as `into_value` without consuming the error
    pub fn to_value(&self) -> LuaValue {
        self.clone().into_value()
    }
}

pub type LuaResult<T> = Result<T, LuaError>;
