/// CALL and TAILCALL
///
/// Neither recurses into the dispatch loop: a script callee gets a frame
/// pushed and the loop reloads its context from the new top frame.
use super::FrameAction;
use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// Arguments of a call at `func_idx`: B-1, or everything up to the dynamic top
#[inline]
fn arg_count(l: &LuaState, func_idx: usize, b: usize) -> usize {
    if b != 0 {
        b - 1
    } else {
        l.stack_top.saturating_sub(func_idx + 1)
    }
}

/// R(A), ..., R(A+C-2) := R(A)(R(A+1), ..., R(A+B-1))
#[inline]
pub fn handle_call(
    l: &mut LuaState,
    base: usize,
    a: usize,
    b: usize,
    c: usize,
) -> LuaResult<FrameAction> {
    let func_idx = base + a;
    let nargs = arg_count(l, func_idx, b);
    let nresults = c as i32 - 1;
    l.stack_top = func_idx + 1 + nargs;
    let pushed = l.precall(func_idx, nargs, func_idx, nresults)?;
    Ok(FrameAction::after_call(l, pushed))
}

/// return R(A)(R(A+1), ..., R(A+B-1))
///
/// A script callee takes over the current frame's slot range and descriptor,
/// so frame depth does not grow. Anything else is an ordinary call keeping
/// all results; the RETURN that follows hands them on.
pub fn handle_tailcall(
    l: &mut LuaState,
    base: usize,
    a: usize,
    b: usize,
) -> LuaResult<FrameAction> {
    let func_idx = base + a;
    if !matches!(l.stack_get(func_idx), LuaValue::Function(_)) {
        return handle_call(l, base, a, b, 0);
    }
    let nargs = arg_count(l, func_idx, b);
    l.stack_top = func_idx + 1 + nargs;

    // the callee's registers will overlap ours
    l.close_upvalues(base);
    let Some(ci) = l.call_stack.pop() else {
        return Err(LuaError::InvalidOperation(
            "tail call without an active frame".to_string(),
        ));
    };
    let dst = ci.func_idx;
    l.move_values(func_idx, dst, nargs + 1);
    let vacated_to = l.stack_top.max(ci.top);
    l.clear_range(dst + 1 + nargs, vacated_to);
    l.stack_top = dst + 1 + nargs;

    let pushed = l.precall(dst, nargs, ci.results_idx, ci.nresults)?;
    if let Some(new_ci) = l.current_frame_mut() {
        new_ci.set_tail();
    }
    Ok(FrameAction::after_call(l, pushed))
}
