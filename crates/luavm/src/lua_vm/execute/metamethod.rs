/// Metamethod resolution
///
/// Handlers are never run on the Rust stack: `call_tm` lays the handler and
/// its operands out above the caller's frame and enters it like any other
/// call, so a script handler becomes an ordinary frame of the dispatch loop.
use super::FrameAction;
use crate::lua_value::LuaValue;
use crate::lua_vm::lua_limits::MAXTAGLOOP;
use crate::lua_vm::{LuaResult, LuaState, OpCode};

/// Tag methods consulted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmKind {
    Index,
    NewIndex,
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    Band,
    Bor,
    Bxor,
    Shl,
    Shr,
    Unm,
    Bnot,
}

impl TmKind {
    pub const fn name(self) -> &'static str {
        match self {
            TmKind::Index => "__index",
            TmKind::NewIndex => "__newindex",
            TmKind::Add => "__add",
            TmKind::Sub => "__sub",
            TmKind::Mul => "__mul",
            TmKind::Mod => "__mod",
            TmKind::Pow => "__pow",
            TmKind::Div => "__div",
            TmKind::IDiv => "__idiv",
            TmKind::Band => "__band",
            TmKind::Bor => "__bor",
            TmKind::Bxor => "__bxor",
            TmKind::Shl => "__shl",
            TmKind::Shr => "__shr",
            TmKind::Unm => "__unm",
            TmKind::Bnot => "__bnot",
        }
    }

    pub fn from_opcode(op: OpCode) -> Option<Self> {
        Some(match op {
            OpCode::Add => TmKind::Add,
            OpCode::Sub => TmKind::Sub,
            OpCode::Mul => TmKind::Mul,
            OpCode::Mod => TmKind::Mod,
            OpCode::Pow => TmKind::Pow,
            OpCode::Div => TmKind::Div,
            OpCode::IDiv => TmKind::IDiv,
            OpCode::BAnd => TmKind::Band,
            OpCode::BOr => TmKind::Bor,
            OpCode::BXor => TmKind::Bxor,
            OpCode::Shl => TmKind::Shl,
            OpCode::Shr => TmKind::Shr,
            OpCode::Unm => TmKind::Unm,
            OpCode::BNot => TmKind::Bnot,
            _ => return None,
        })
    }

    fn is_bitwise(self) -> bool {
        matches!(
            self,
            TmKind::Band | TmKind::Bor | TmKind::Bxor | TmKind::Shl | TmKind::Shr | TmKind::Bnot
        )
    }
}

/// Result of walking an `__index` chain
pub enum IndexOutcome {
    Value(LuaValue),
    /// A function handler must be called with `(receiver, key)`
    Call { handler: LuaValue, receiver: LuaValue },
}

/// Result of walking a `__newindex` chain
pub enum NewIndexOutcome {
    Done,
    /// A function handler must be called with `(receiver, key, value)`
    Call { handler: LuaValue, receiver: LuaValue },
}

/// Resolve `obj[key]`, following table-valued `__index` handlers
pub fn index_chain(l: &LuaState, mut obj: LuaValue, key: &LuaValue) -> LuaResult<IndexOutcome> {
    for _ in 0..MAXTAGLOOP {
        let handler = match &obj {
            LuaValue::Table(t) => {
                let t = t.borrow();
                let value = t.raw_get(key);
                if !value.is_nil() {
                    return Ok(IndexOutcome::Value(value));
                }
                match t.get_metatable() {
                    Some(mt) => mt.borrow().get_str(TmKind::Index.name()),
                    None => return Ok(IndexOutcome::Value(LuaValue::Nil)),
                }
            }
            other => {
                return Err(l.type_error(format!(
                    "attempt to index a {} value",
                    other.type_name()
                )));
            }
        };
        match handler {
            LuaValue::Nil => return Ok(IndexOutcome::Value(LuaValue::Nil)),
            LuaValue::Function(_) | LuaValue::CFunction(_) => {
                return Ok(IndexOutcome::Call {
                    handler,
                    receiver: obj,
                });
            }
            next => obj = next,
        }
    }
    Err(l.type_error("'__index' chain too long; possible loop"))
}

/// Perform `obj[key] = value`, following table-valued `__newindex` handlers.
/// The raw write happens when the key is already present or no handler exists.
pub fn newindex_chain(
    l: &LuaState,
    mut obj: LuaValue,
    key: &LuaValue,
    value: &LuaValue,
) -> LuaResult<NewIndexOutcome> {
    for _ in 0..MAXTAGLOOP {
        let LuaValue::Table(table) = &obj else {
            return Err(l.type_error(format!(
                "attempt to index a {} value",
                obj.type_name()
            )));
        };
        let handler = {
            let t = table.borrow();
            if t.contains_key(key) {
                LuaValue::Nil
            } else {
                t.get_metatable()
                    .map(|mt| mt.borrow().get_str(TmKind::NewIndex.name()))
                    .unwrap_or_default()
            }
        };
        match handler {
            LuaValue::Nil => {
                table
                    .borrow_mut()
                    .raw_set(key.clone(), value.clone())
                    .map_err(|msg| l.type_error(msg))?;
                return Ok(NewIndexOutcome::Done);
            }
            LuaValue::Function(_) | LuaValue::CFunction(_) => {
                return Ok(NewIndexOutcome::Call {
                    handler,
                    receiver: obj,
                });
            }
            next => obj = next,
        }
    }
    Err(l.type_error("'__newindex' chain too long; possible loop"))
}

/// Enter `handler(args...)` in the scratch area above the current frame.
/// `dest` receives the first result; `None` discards all results.
pub fn call_tm(
    l: &mut LuaState,
    handler: LuaValue,
    args: &[LuaValue],
    dest: Option<usize>,
) -> LuaResult<FrameAction> {
    let slot = l
        .current_frame()
        .map_or(l.stack_top, |ci| ci.top.max(l.stack_top));
    l.ensure_stack(slot + 1 + args.len())?;
    l.stack_set(slot, handler);
    for (i, arg) in args.iter().enumerate() {
        l.stack_set(slot + 1 + i, arg.clone());
    }
    l.stack_top = slot + 1 + args.len();
    let (results_idx, nresults) = match dest {
        Some(dest) => (dest, 1),
        None => (slot, 0),
    };
    let pushed = l.precall(slot, args.len(), results_idx, nresults)?;
    Ok(FrameAction::after_call(l, pushed))
}

/// Arithmetic or bitwise fallback: the left operand's handler, then the
/// right's, called with `(left, right)`
pub fn arith_tm(
    l: &mut LuaState,
    op: OpCode,
    left: LuaValue,
    right: LuaValue,
    dest: usize,
) -> LuaResult<FrameAction> {
    let Some(tm) = TmKind::from_opcode(op) else {
        return Err(l.type_error(format!("no metamethod for {}", op.name())));
    };
    let handler = left
        .get_metamethod(tm.name())
        .or_else(|| right.get_metamethod(tm.name()));
    if let Some(handler) = handler {
        return call_tm(l, handler, &[left, right], Some(dest));
    }

    let unary = matches!(tm, TmKind::Unm | TmKind::Bnot);
    if tm.is_bitwise() && left.to_number().is_some() && right.to_number().is_some() {
        return Err(l.type_error("number has no integer representation"));
    }
    let what = if tm.is_bitwise() {
        "perform bitwise operation on"
    } else {
        "perform arithmetic on"
    };
    if unary {
        Err(l.type_error(format!("attempt to {} a {} value", what, left.type_name())))
    } else {
        Err(l.type_error(format!(
            "attempt to {} a {} and a {}",
            what,
            left.type_name(),
            right.type_name()
        )))
    }
}
