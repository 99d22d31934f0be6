// GETTABLE / SETTABLE family and SETLIST

use super::FrameAction;
use super::metamethod::{IndexOutcome, NewIndexOutcome, call_tm, index_chain, newindex_chain};
use crate::lua_value::LuaValue;
use crate::lua_vm::LuaResult;
use crate::lua_vm::LuaState;
use crate::lua_vm::lua_limits::LFIELDS_PER_FLUSH;

/// `stack[dest] = obj[key]`
#[inline]
pub fn get_table(
    l: &mut LuaState,
    obj: LuaValue,
    key: LuaValue,
    dest: usize,
) -> LuaResult<FrameAction> {
    // fast path: plain table hit, or miss without a metatable
    if let LuaValue::Table(t) = &obj {
        let fast = {
            let t = t.borrow();
            let value = t.raw_get(&key);
            if !value.is_nil() || t.get_metatable().is_none() {
                Some(value)
            } else {
                None
            }
        };
        if let Some(value) = fast {
            l.stack_set(dest, value);
            return Ok(FrameAction::Continue);
        }
    }
    match index_chain(l, obj, &key)? {
        IndexOutcome::Value(value) => {
            l.stack_set(dest, value);
            Ok(FrameAction::Continue)
        }
        IndexOutcome::Call { handler, receiver } => {
            call_tm(l, handler, &[receiver, key], Some(dest))
        }
    }
}

/// `obj[key] = value`
#[inline]
pub fn set_table(
    l: &mut LuaState,
    obj: LuaValue,
    key: LuaValue,
    value: LuaValue,
) -> LuaResult<FrameAction> {
    if let LuaValue::Table(t) = &obj {
        let plain = t.borrow().get_metatable().is_none();
        if plain {
            t.borrow_mut()
                .raw_set(key, value)
                .map_err(|msg| l.type_error(msg))?;
            return Ok(FrameAction::Continue);
        }
    }
    match newindex_chain(l, obj, &key, &value)? {
        NewIndexOutcome::Done => Ok(FrameAction::Continue),
        NewIndexOutcome::Call { handler, receiver } => {
            call_tm(l, handler, &[receiver, key, value], None)
        }
    }
}

/// R(A)[(block-1)*FPF + i] := R(A+i), 1 <= i <= n
pub fn set_list(l: &mut LuaState, ra: usize, n: usize, block: usize) -> LuaResult<()> {
    let table = l.stack_get(ra);
    let Some(table) = table.as_table() else {
        return Err(l.type_error(format!(
            "attempt to index a {} value",
            table.type_name()
        )));
    };
    let first = block.saturating_sub(1) * LFIELDS_PER_FLUSH;
    let mut t = table.borrow_mut();
    for i in 1..=n {
        t.set_int((first + i) as i64, l.stack_get(ra + i));
    }
    Ok(())
}
