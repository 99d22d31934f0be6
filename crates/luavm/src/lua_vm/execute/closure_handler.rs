// CLOSURE and VARARG

use std::rc::Rc;

use crate::lua_value::{LuaFunction, LuaUpvalue, LuaValue};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// R(A) := closure(KPROTO[Bx])
///
/// Local captures share the open upvalue of the enclosing frame's slot;
/// the others reuse the enclosing closure's own upvalue.
pub fn handle_closure(
    l: &mut LuaState,
    parent: &LuaFunction,
    base: usize,
    bx: usize,
) -> LuaResult<LuaValue> {
    let Some(proto) = parent.chunk.child_protos.get(bx) else {
        return Err(LuaError::InvalidOperation(format!(
            "no prototype {} in function",
            bx
        )));
    };
    let mut upvalues: Vec<Rc<LuaUpvalue>> = Vec::with_capacity(proto.upvalue_descs.len());
    for desc in &proto.upvalue_descs {
        let index = desc.index as usize;
        let upval = if desc.is_local {
            l.find_or_create_upvalue(base + index)
        } else {
            parent.upvalues.get(index).cloned().ok_or_else(|| {
                LuaError::InvalidOperation(format!("no upvalue {} in enclosing function", index))
            })?
        };
        upvalues.push(upval);
    }
    Ok(LuaValue::function(LuaFunction::new(proto.clone(), upvalues)))
}

/// R(A), ..., R(A+B-2) := vararg
///
/// B=0 copies every extra argument and moves the dynamic top past them.
pub fn handle_vararg(l: &mut LuaState, base: usize, a: usize, b: usize) -> LuaResult<()> {
    let nvarargs = l.current_frame().map_or(0, |ci| ci.nvarargs);
    let dest = base + a;
    let n = if b == 0 {
        l.ensure_stack(dest + nvarargs)?;
        l.stack_top = dest + nvarargs;
        nvarargs
    } else {
        b - 1
    };
    let src = base - nvarargs;
    for i in 0..n {
        let value = if i < nvarargs {
            l.stack_get(src + i)
        } else {
            LuaValue::Nil
        };
        l.stack_set(dest + i, value);
    }
    Ok(())
}
